use ndarray::{Array3, ArrayView3, Axis};
use tracing::debug;

/// Source index for position `i` of an axis of length `n` extended by
/// symmetric reflection (`d c b a | a b c d | d c b a`), repeating for pads
/// longer than the axis.
#[inline]
pub fn mirror_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let m = i.rem_euclid(2 * n);
    if m < n { m as usize } else { (2 * n - 1 - m) as usize }
}

/// Mirror-pad the two spatial axes of a `(height, width, channel)` array by
/// `pad` pixels on every side. The edge pixel is repeated, which keeps local
/// statistics at the borders close to the interior ones.
pub fn mirror_pad(data: ArrayView3<'_, f32>, pad: usize) -> Array3<f32> {
    let (rows, cols, bands) = data.dim();
    if pad == 0 {
        return data.to_owned();
    }
    assert!(rows > 0 && cols > 0, "cannot mirror-pad an empty array");

    let row_map: Vec<usize> = (0..rows + 2 * pad)
        .map(|r| mirror_index(r as isize - pad as isize, rows))
        .collect();
    let col_map: Vec<usize> = (0..cols + 2 * pad)
        .map(|c| mirror_index(c as isize - pad as isize, cols))
        .collect();

    debug!(
        "Mirror padding: {}x{}x{} by {} -> {}x{}",
        rows,
        cols,
        bands,
        pad,
        row_map.len(),
        col_map.len()
    );

    data.select(Axis(0), &row_map).select(Axis(1), &col_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, s};

    #[test]
    fn mirror_index_is_symmetric() {
        let idx: Vec<usize> = (-3..7).map(|i| mirror_index(i, 4)).collect();
        assert_eq!(idx, vec![2, 1, 0, 0, 1, 2, 3, 3, 2, 1]);
        // Pads longer than the axis keep reflecting
        assert_eq!(mirror_index(-5, 2), 0);
        assert_eq!(mirror_index(5, 2), 1);
    }

    #[test]
    fn pad_repeats_edge_pixels() {
        let data = Array3::from_shape_fn((3, 4, 2), |(r, c, b)| {
            (r * 10 + c) as f32 + b as f32 * 100.0
        });
        let padded = mirror_pad(data.view(), 2);
        assert_eq!(padded.dim(), (7, 8, 2));
        assert_eq!(padded.slice(s![2..5, 2..6, ..]), data);
        // Row 0 mirrors source row 1, column 0 mirrors source column 1
        assert_eq!(padded[[0, 0, 0]], data[[1, 1, 0]]);
        assert_eq!(padded[[1, 2, 1]], data[[0, 0, 1]]);
        assert_eq!(padded[[6, 7, 0]], data[[1, 2, 0]]);
        assert_eq!(padded[[3, 7, 0]], data[[1, 2, 0]]);
    }

    #[test]
    fn zero_pad_is_identity() {
        let data = Array3::from_elem((2, 2, 1), 5.0f32);
        assert_eq!(mirror_pad(data.view(), 0), data);
    }
}
