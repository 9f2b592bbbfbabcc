use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use tracing::trace;

use crate::error::{Error, Result};

/// Bilinearly resize one single-channel plane to `(target_rows, target_cols)`.
pub fn resize_plane_bilinear(
    plane: ArrayView2<'_, f32>,
    target_rows: usize,
    target_cols: usize,
) -> Result<Array2<f32>> {
    let (rows, cols) = plane.dim();
    if (rows, cols) == (target_rows, target_cols) {
        return Ok(plane.to_owned());
    }
    trace!(
        "Bilinear resize {}x{} -> {}x{}",
        rows, cols, target_rows, target_cols
    );

    let resize_options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();

    // fast_image_resize takes raw bytes in native endianness for F32 pixels
    let mut src_bytes = Vec::with_capacity(rows * cols * 4);
    for &v in plane.iter() {
        src_bytes.extend_from_slice(&v.to_ne_bytes());
    }

    let src_image = Image::from_vec_u8(cols as u32, rows as u32, src_bytes, PixelType::F32)
        .map_err(Error::external)?;
    let mut dst_image = Image::new(target_cols as u32, target_rows as u32, PixelType::F32);
    resizer
        .resize(&src_image, &mut dst_image, &resize_options)
        .map_err(Error::external)?;

    let dst_bytes = dst_image.into_vec();
    let values: Vec<f32> = dst_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Array2::from_shape_vec((target_rows, target_cols), values)
        .map_err(|e| Error::Processing(format!("resized plane has wrong size: {}", e)))
}

/// Bilinearly upsample every channel of a channel-first `(C, h, w)` patch to
/// `(C, target_rows, target_cols)`.
pub fn upsample_channels(
    patch: ArrayView3<'_, f32>,
    target_rows: usize,
    target_cols: usize,
) -> Result<Array3<f32>> {
    let bands = patch.len_of(Axis(0));
    let mut out = Array3::<f32>::zeros((bands, target_rows, target_cols));
    for (band, mut dst) in out.axis_iter_mut(Axis(0)).enumerate() {
        let resized =
            resize_plane_bilinear(patch.index_axis(Axis(0), band), target_rows, target_cols)?;
        dst.assign(&resized);
    }
    Ok(out)
}

/// Nearest-neighbour enlargement of a plane by an integer factor.
pub fn repeat_nearest<T: Copy>(plane: ArrayView2<'_, T>, factor: usize) -> Array2<T> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows * factor, cols * factor), |(r, c)| {
        plane[[r / factor, c / factor]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_plane_stays_constant() {
        let plane = Array2::from_elem((4, 4), 7.5f32);
        let up = resize_plane_bilinear(plane.view(), 12, 12).unwrap();
        assert_eq!(up.dim(), (12, 12));
        for &v in up.iter() {
            assert_abs_diff_eq!(v, 7.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn upsampled_values_stay_in_range() {
        let patch = Array3::from_shape_fn((2, 5, 5), |(b, r, c)| (b * 100 + r * 5 + c) as f32);
        let up = upsample_channels(patch.view(), 15, 15).unwrap();
        assert_eq!(up.dim(), (2, 15, 15));
        for b in 0..2 {
            let lo = (b * 100) as f32;
            let hi = (b * 100 + 24) as f32;
            for &v in up.index_axis(Axis(0), b).iter() {
                assert!(v >= lo - 1e-3 && v <= hi + 1e-3, "{} outside [{}, {}]", v, lo, hi);
            }
        }
    }

    #[test]
    fn same_shape_is_a_copy() {
        let plane = Array2::from_shape_fn((3, 2), |(r, c)| (r * 2 + c) as f32);
        assert_eq!(resize_plane_bilinear(plane.view(), 3, 2).unwrap(), plane);
    }

    #[test]
    fn nearest_repeat() {
        let plane = ndarray::arr2(&[[true, false], [false, true]]);
        let big = repeat_nearest(plane.view(), 3);
        assert_eq!(big.dim(), (6, 6));
        assert!(big[[2, 2]]);
        assert!(!big[[2, 3]]);
        assert!(big[[5, 5]]);
    }
}
