//! Reassembly of predicted patches into a full image.
use ndarray::{Array3, ArrayView4, Axis, s};
use tracing::debug;

use crate::core::processing::tiling::{PatchGeometry, PatchGrid};
use crate::core::resolution::PixelSemantics;
use crate::error::{Error, Result};
use crate::types::Resolution;

/// Paste the interiors of `(N, C, p, p)` patches at their grid positions.
///
/// Returns the channel-first `(C, height, width)` canvas at `level`, where
/// `image_size` is that level's unpadded `(height, width)`. Overlapping
/// interiors (only the flush row/column) are overwritten in grid order.
pub fn paste_patches(
    patches: ArrayView4<'_, f32>,
    grid: &PatchGrid,
    geometry: &PatchGeometry,
    level: Resolution,
    image_size: (usize, usize),
) -> Result<Array3<f32>> {
    let (n, bands, ph, pw) = patches.dim();
    let patch = geometry.patch_size(level);
    if n != grid.len() {
        return Err(Error::Processing(format!(
            "got {} patches for a grid of {} cells",
            n,
            grid.len()
        )));
    }
    if ph != patch || pw != patch {
        return Err(Error::Processing(format!(
            "patches at {}m are {}x{}, expected {}x{}",
            level, ph, pw, patch, patch
        )));
    }

    let inv = geometry.scales().inv_scale(level);
    let (height, width) = image_size;
    let expected = (
        grid.rows().last().map_or(0, |r| r * inv) + geometry.interior(level),
        grid.cols().last().map_or(0, |c| c * inv) + geometry.interior(level),
    );
    if expected != image_size {
        return Err(Error::Processing(format!(
            "grid covers {}x{} at {}m but the image is {}x{}",
            expected.0, expected.1, level, height, width
        )));
    }

    let border = geometry.border(level);
    let interior = geometry.interior(level);
    debug!(
        "Recomposing {} patches of {}x{}x{} into {}x{} (border {})",
        n, bands, patch, patch, height, width, border
    );

    let mut canvas = Array3::<f32>::zeros((bands, height, width));
    for (i, (r, c)) in grid.origins().enumerate() {
        let (y, x) = (r * inv, c * inv);
        let inner = patches.index_axis(Axis(0), i);
        canvas
            .slice_mut(s![.., y..y + interior, x..x + interior])
            .assign(&inner.slice(s![.., border..border + interior, border..border + interior]));
    }
    Ok(canvas)
}

/// Paste predictions and undo normalisation.
///
/// The result is `(height, width, C)` in physical units, clipped to
/// `[min_val, max_val]`.
pub fn recompose(
    patches: ArrayView4<'_, f32>,
    grid: &PatchGrid,
    geometry: &PatchGeometry,
    level: Resolution,
    image_size: (usize, usize),
    pixels: &PixelSemantics,
) -> Result<Array3<f32>> {
    let mut canvas = paste_patches(patches, grid, geometry, level, image_size)?;
    let (lo, hi) = (pixels.min_val, pixels.max_val);
    canvas.mapv_inplace(|v| (v * pixels.norm).clamp(lo, hi));
    Ok(canvas.permuted_axes([1, 2, 0]).as_standard_layout().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::tiling::extract_patches;
    use crate::core::raster::{GeoReference, Raster};
    use crate::core::resolution::ScaleTable;
    use approx::assert_abs_diff_eq;
    use ndarray::Array4;
    use std::collections::BTreeMap;

    fn ramp_raster(size: usize) -> Raster {
        let mut levels = BTreeMap::new();
        levels.insert(
            Resolution(10),
            Array3::from_shape_fn((size, size, 2), |(r, c, b)| {
                (r * 7 + c * 3 + b * 1000) as f32
            }),
        );
        levels.insert(
            Resolution(20),
            Array3::from_shape_fn((size / 2, size / 2, 1), |(r, c, _)| (r + c) as f32),
        );
        Raster::new(levels, GeoReference::default()).unwrap()
    }

    fn geometry(patch: usize, border: usize) -> PatchGeometry {
        let scales = ScaleTable::new([Resolution(10), Resolution(20)]).unwrap();
        PatchGeometry::new(scales, patch, border).unwrap()
    }

    fn lossless() -> PixelSemantics {
        PixelSemantics {
            min_val: f32::MIN,
            max_val: f32::MAX,
            fill_val: 0.0,
            norm: 1.0,
        }
    }

    #[test]
    fn identity_roundtrip_every_level() {
        let raster = ramp_raster(50);
        let geometry = geometry(16, 2);
        let batch = extract_patches(&raster, &geometry, 1.0, false).unwrap();
        for (res, data) in raster.levels() {
            let (h, w, _) = data.dim();
            let out = recompose(
                batch.levels[res].view(),
                &batch.grid,
                &geometry,
                *res,
                (h, w),
                &lossless(),
            )
            .unwrap();
            assert_eq!(&out, data, "level {}m", res);
        }
    }

    #[test]
    fn normalisation_is_undone() {
        let raster = ramp_raster(40);
        let geometry = geometry(12, 2);
        let batch = extract_patches(&raster, &geometry, 2000.0, false).unwrap();
        let pixels = PixelSemantics::default();
        let out = recompose(
            batch.levels[&Resolution(10)].view(),
            &batch.grid,
            &geometry,
            Resolution(10),
            (40, 40),
            &pixels,
        )
        .unwrap();
        let fine = raster.level(Resolution(10)).unwrap();
        for (a, b) in out.iter().zip(fine.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-2);
        }
    }

    #[test]
    fn values_are_clipped() {
        let raster = ramp_raster(20);
        let geometry = geometry(8, 2);
        let batch = extract_patches(&raster, &geometry, 1.0, false).unwrap();
        let patches = batch.levels[&Resolution(10)].mapv(|v| v * 100.0 - 500.0);
        let pixels = PixelSemantics {
            min_val: 0.0,
            max_val: 10_000.0,
            fill_val: 0.0,
            norm: 1.0,
        };
        let out = recompose(
            patches.view(),
            &batch.grid,
            &geometry,
            Resolution(10),
            (20, 20),
            &pixels,
        )
        .unwrap();
        assert!(out.iter().all(|&v| (0.0..=10_000.0).contains(&v)));
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[19, 19, 1]], 10_000.0);
    }

    #[test]
    fn wrong_patch_count_is_rejected() {
        let raster = ramp_raster(20);
        let geometry = geometry(8, 2);
        let batch = extract_patches(&raster, &geometry, 1.0, false).unwrap();
        let short = Array4::<f32>::zeros((batch.len() - 1, 2, 8, 8));
        assert!(
            paste_patches(short.view(), &batch.grid, &geometry, Resolution(10), (20, 20)).is_err()
        );
    }
}
