//! Synthetic resolution degradation used to build supervised training pairs.
//!
//! Each channel is smoothed with a Gaussian of sigma `1/scale` and then
//! block-averaged by `scale`, modelling how the sensor integrates radiance
//! over a coarser footprint.
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use tracing::debug;

use crate::core::processing::padding::mirror_index;

/// Gaussian tails beyond this many sigmas are dropped.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Normalised 1-D Gaussian kernel of radius `round(4 * sigma)`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur of one plane with symmetric boundary handling.
pub fn gaussian_blur(plane: ArrayView2<'_, f32>, sigma: f64) -> Array2<f64> {
    let (h, w) = plane.dim();
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    // horizontal
    let mut tmp = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = mirror_index(x as isize + k as isize - radius, w);
                acc += weight * plane[[y, sx]] as f64;
            }
            tmp[[y, x]] = acc;
        }
    }
    // vertical
    let mut out = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = mirror_index(y as isize + k as isize - radius, h);
                acc += weight * tmp[[sy, x]];
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Mean over non-overlapping `factor x factor` blocks; trailing rows/columns
/// that do not fill a block are dropped.
pub fn block_mean(plane: ArrayView2<'_, f64>, factor: usize) -> Array2<f64> {
    let (h, w) = plane.dim();
    let (nh, nw) = (h / factor, w / factor);
    let area = (factor * factor) as f64;
    Array2::from_shape_fn((nh, nw), |(r, c)| {
        let block = plane.slice(ndarray::s![
            r * factor..(r + 1) * factor,
            c * factor..(c + 1) * factor
        ]);
        block.sum() / area
    })
}

/// Degrade a `(height, width, channel)` array by `scale`.
pub fn downsample(data: ArrayView3<'_, f32>, scale: usize) -> Array3<f32> {
    assert!(scale > 0, "downsampling scale must be positive");
    let (h, w, bands) = data.dim();
    if scale == 1 {
        return data.to_owned();
    }
    debug!(
        "Downsampling {}x{}x{} by {} (sigma={:.3})",
        h,
        w,
        bands,
        scale,
        1.0 / scale as f64
    );

    let sigma = 1.0 / scale as f64;
    let mut out = Array3::<f32>::zeros((h / scale, w / scale, bands));
    for band in 0..bands {
        let blurred = gaussian_blur(data.index_axis(Axis(2), band), sigma);
        let reduced = block_mean(blurred.view(), scale);
        out.index_axis_mut(Axis(2), band)
            .assign(&reduced.mapv(|v| v as f32));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::resize::upsample_channels;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    #[test]
    fn kernel_radius_follows_sigma() {
        // sigma 0.5 -> radius 2, sigma 1/6 -> radius 1
        assert_eq!(gaussian_kernel(0.5).len(), 5);
        assert_eq!(gaussian_kernel(1.0 / 6.0).len(), 3);
        assert_abs_diff_eq!(gaussian_kernel(0.5).iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_input_is_preserved() {
        let data = Array3::from_elem((12, 18, 2), 1234.0f32);
        let lr = downsample(data.view(), 3);
        assert_eq!(lr.dim(), (4, 6, 2));
        for &v in lr.iter() {
            assert_abs_diff_eq!(v, 1234.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn downsample_then_upsample_keeps_shape_and_range() {
        let data = Array3::from_shape_fn((24, 24, 1), |(r, c, _)| ((r * 31 + c * 17) % 97) as f32 * 10.0);
        let (lo, hi) = data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let lr = downsample(data.view(), 2);
        assert_eq!(lr.dim(), (12, 12, 1));
        let chw = lr.view().permuted_axes([2, 0, 1]);
        let up = upsample_channels(chw, 24, 24).unwrap();
        assert_eq!(up.dim(), (1, 24, 24));
        for &v in up.iter() {
            assert!(v >= lo - 1e-2 && v <= hi + 1e-2);
        }
    }

    #[test]
    fn trailing_pixels_are_dropped() {
        let data = Array3::from_elem((7, 5, 1), 1.0f32);
        assert_eq!(downsample(data.view(), 2).dim(), (3, 2, 1));
    }
}
