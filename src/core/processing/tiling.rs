//! Patch grid tiling of a multi-resolution raster.
//!
//! Every level is mirror-padded by its own share of the border, then a grid of
//! fixed-size patches is laid out at the coarsest level with stride
//! `patch - 2 * border`. When the stride does not divide the image, one extra
//! origin is placed flush with the far edge so the last patch overlaps its
//! neighbour instead of running off the image. Each grid cell is cropped from
//! every level at the scale-adjusted position, so all crops of a cell cover the
//! same ground footprint.
use std::collections::BTreeMap;

use ndarray::{Array4, Axis, s};
use tracing::{debug, info, warn};

use crate::core::processing::padding::mirror_pad;
use crate::core::processing::resize::upsample_channels;
use crate::core::raster::Raster;
use crate::core::resolution::ScaleTable;
use crate::error::{Error, Result};
use crate::types::Resolution;

/// Patch size and border of one run, stored at the coarsest level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchGeometry {
    scales: ScaleTable,
    patch: usize,
    border: usize,
}

impl PatchGeometry {
    /// `patch_size` and `border` are given in finest-level pixels and rounded
    /// down to multiples of the coarsest scale so every level gets an exact
    /// integer crop.
    pub fn new(scales: ScaleTable, patch_size: usize, border: usize) -> Result<Self> {
        let m = scales.max_scale();
        let (patch, border_c) = (patch_size / m, border / m);
        if patch * m != patch_size || border_c * m != border {
            warn!(
                "Patch size {} / border {} are not multiples of the coarsest scale {}; using {} / {}",
                patch_size,
                border,
                m,
                patch * m,
                border_c * m
            );
        }
        if patch <= 2 * border_c {
            return Err(Error::config(format!(
                "patch size {} must be larger than twice the border {} at the coarsest level {}m",
                patch * m,
                border_c * m,
                scales.coarsest()
            )));
        }
        Ok(Self {
            scales,
            patch,
            border: border_c,
        })
    }

    pub fn scales(&self) -> &ScaleTable {
        &self.scales
    }

    /// Patch edge at `res`, in that level's pixels.
    pub fn patch_size(&self, res: Resolution) -> usize {
        self.patch * self.scales.inv_scale(res)
    }

    /// Border width at `res`, in that level's pixels.
    pub fn border(&self, res: Resolution) -> usize {
        self.border * self.scales.inv_scale(res)
    }

    /// Interior (patch minus borders) at `res`.
    pub fn interior(&self, res: Resolution) -> usize {
        self.patch_size(res) - 2 * self.border(res)
    }

    pub fn coarse_patch(&self) -> usize {
        self.patch
    }

    pub fn coarse_border(&self) -> usize {
        self.border
    }
}

/// Grid origins at the coarsest level, in padded coordinates. The interior of
/// the patch at origin `o` covers unpadded pixels `o..o + stride`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchGrid {
    rows: Vec<usize>,
    cols: Vec<usize>,
}

impl PatchGrid {
    /// Grid for an unpadded coarsest-level image of `(height, width)`.
    pub fn new(size: (usize, usize), geometry: &PatchGeometry) -> Result<Self> {
        let (patch, border) = (geometry.coarse_patch(), geometry.coarse_border());
        Ok(Self {
            rows: Self::axis_origins(size.0, patch, border)?,
            cols: Self::axis_origins(size.1, patch, border)?,
        })
    }

    /// Origins along one axis: `0, Q, 2Q, ...` for every full stride, then
    /// `padded - patch` when the stride leaves a remainder (flush last tile).
    pub fn axis_origins(size: usize, patch: usize, border: usize) -> Result<Vec<usize>> {
        let padded = size + 2 * border;
        if patch > padded {
            return Err(Error::config(format!(
                "patch size {} exceeds the padded image side {}",
                patch, padded
            )));
        }
        let stride = patch - 2 * border;
        let full = size / stride;
        let mut origins: Vec<usize> = (0..full).map(|k| k * stride).collect();
        if size % stride != 0 {
            origins.push(padded - patch);
        }
        Ok(origins)
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn len(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell origins in row-major order; this order is the patch order.
    pub fn origins(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .flat_map(move |&r| self.cols.iter().map(move |&c| (r, c)))
    }
}

/// Channel-first patches of every level, in grid order.
#[derive(Debug, Clone)]
pub struct PatchBatch {
    pub grid: PatchGrid,
    pub geometry: PatchGeometry,
    /// `(N, C, h, w)` per level
    pub levels: BTreeMap<Resolution, Array4<f32>>,
    /// Unpadded finest-level `(height, width)` the grid was built for
    pub image_size: (usize, usize),
}

impl PatchBatch {
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Inputs keyed by resolution identifier, the shape predictors consume.
    pub fn predictor_inputs(&self) -> BTreeMap<String, Array4<f32>> {
        self.levels
            .iter()
            .map(|(res, data)| (res.id(), data.clone()))
            .collect()
    }
}

/// Cut `raster` into an ordered batch of aligned patch bundles.
///
/// Pixel values are divided by `norm`. With `interp`, every level's patches
/// are bilinearly upsampled to the finest patch shape, which is how training
/// inputs are built.
pub fn extract_patches(
    raster: &Raster,
    geometry: &PatchGeometry,
    norm: f32,
    interp: bool,
) -> Result<PatchBatch> {
    let scales = geometry.scales();
    if scales.levels() != raster.resolutions().as_slice() {
        return Err(Error::Processing(format!(
            "patch geometry was built for levels {:?}, raster has {:?}",
            scales.levels(),
            raster.resolutions()
        )));
    }
    let coarsest = scales.coarsest();
    let finest = scales.finest();
    let (ch, cw, _) = raster
        .level(coarsest)
        .map(|a| a.dim())
        .ok_or_else(|| Error::Processing(format!("raster has no {}m level", coarsest)))?;
    let grid = PatchGrid::new((ch, cw), geometry)?;

    info!(
        "Tiling {}x{} image into {} patches ({} rows x {} cols), patch {} / border {} at {}m",
        raster.size().0,
        raster.size().1,
        grid.len(),
        grid.rows().len(),
        grid.cols().len(),
        geometry.patch_size(finest),
        geometry.border(finest),
        finest
    );

    let mut levels = BTreeMap::new();
    for (&res, data) in raster.levels() {
        let inv = scales.inv_scale(res);
        let patch = geometry.patch_size(res);
        let padded = mirror_pad(data.view(), geometry.border(res));
        let bands = data.len_of(Axis(2));
        debug!(
            "Level {}m: padded {:?}, patch {}x{}x{}",
            res,
            padded.dim(),
            bands,
            patch,
            patch
        );

        let mut patches = Array4::<f32>::zeros((grid.len(), bands, patch, patch));
        for (i, (r, c)) in grid.origins().enumerate() {
            let (y, x) = (r * inv, c * inv);
            let crop = padded.slice(s![y..y + patch, x..x + patch, ..]);
            patches
                .index_axis_mut(Axis(0), i)
                .assign(&crop.permuted_axes([2, 0, 1]));
        }
        patches.mapv_inplace(|v| v / norm);
        levels.insert(res, patches);
    }

    if interp {
        let target = geometry.patch_size(finest);
        for (res, patches) in levels.iter_mut() {
            if *res == finest {
                continue;
            }
            let (n, bands, _, _) = patches.dim();
            let mut up = Array4::<f32>::zeros((n, bands, target, target));
            for (i, mut dst) in up.axis_iter_mut(Axis(0)).enumerate() {
                dst.assign(&upsample_channels(
                    patches.index_axis(Axis(0), i),
                    target,
                    target,
                )?);
            }
            *patches = up;
        }
    }

    Ok(PatchBatch {
        grid,
        geometry: geometry.clone(),
        levels,
        image_size: raster.size(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scales(levels: &[u32]) -> ScaleTable {
        ScaleTable::new(levels.iter().map(|&r| Resolution(r))).unwrap()
    }

    #[test]
    fn flush_last_origin() {
        // size 200, patch 42, border 2 -> stride 38: 5 full strides + flush
        let origins = PatchGrid::axis_origins(200, 42, 2).unwrap();
        assert_eq!(origins, vec![0, 38, 76, 114, 152, 162]);
    }

    #[test]
    fn exact_fit_has_no_flush_origin() {
        let origins = PatchGrid::axis_origins(90, 34, 2).unwrap();
        assert_eq!(origins, vec![0, 30, 60]);
    }

    #[test]
    fn patch_larger_than_image_is_rejected() {
        assert!(PatchGrid::axis_origins(10, 20, 2).is_err());
    }

    #[test]
    fn geometry_rounds_to_coarsest_scale() {
        let geometry = PatchGeometry::new(scales(&[10, 30]), 128, 8).unwrap();
        assert_eq!(geometry.coarse_patch(), 42);
        assert_eq!(geometry.coarse_border(), 2);
        assert_eq!(geometry.patch_size(Resolution(10)), 126);
        assert_eq!(geometry.border(Resolution(10)), 6);
        assert_eq!(geometry.interior(Resolution(10)), 114);
    }

    #[test]
    fn border_too_wide_is_configuration_error() {
        let err = PatchGeometry::new(scales(&[10, 20]), 32, 16).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn interiors_cover_every_pixel() {
        for size in [37usize, 60, 61, 200, 257] {
            let (patch, border) = (24, 3);
            let stride = patch - 2 * border;
            let origins = PatchGrid::axis_origins(size, patch, border).unwrap();
            let mut hits = vec![0usize; size];
            for o in &origins {
                for h in hits.iter_mut().skip(*o).take(stride) {
                    *h += 1;
                }
            }
            assert!(hits.iter().all(|&h| h >= 1), "gap for size {}", size);
            // Only the flush cell may overlap its neighbour
            let regular = &origins[..size / stride];
            let mut regular_hits = vec![0usize; size];
            for o in regular {
                for h in regular_hits.iter_mut().skip(*o).take(stride) {
                    *h += 1;
                }
            }
            assert!(regular_hits.iter().all(|&h| h <= 1));
        }
    }
}
