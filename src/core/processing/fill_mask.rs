//! No-data bookkeeping across reconstruction.
use std::collections::BTreeMap;

use ndarray::{Array2, Array3, Axis, Zip, s};
use tracing::{debug, warn};

use crate::core::processing::resize::repeat_nearest;
use crate::core::raster::Raster;
use crate::error::{Error, Result};
use crate::types::Resolution;

/// Per-level boolean masks, true where a pixel held the fill value.
#[derive(Debug, Clone)]
pub struct FillMask {
    fill_val: f32,
    levels: BTreeMap<Resolution, Array3<bool>>,
}

impl FillMask {
    /// Record masks from raw (not yet normalised) pixel values.
    pub fn record(raster: &Raster, fill_val: f32) -> Self {
        let levels: BTreeMap<Resolution, Array3<bool>> = raster
            .levels()
            .iter()
            .map(|(res, data)| (*res, data.mapv(|v| v == fill_val)))
            .collect();
        for (res, mask) in &levels {
            let count = mask.iter().filter(|&&m| m).count();
            debug!("Fill mask {}m: {} of {} values", res, count, mask.len());
        }
        Self { fill_val, levels }
    }

    /// Finest-level mask collapsed over bands: a pixel is no-data when any
    /// of its bands is.
    pub fn finest_plane(&self) -> Option<Array2<bool>> {
        let mask = self.levels.values().next()?;
        Some(mask.map_axis(Axis(2), |lane| lane.iter().any(|&m| m)))
    }

    /// Put the fill value back into an original level from its own mask.
    pub fn restore_level(&self, res: Resolution, data: &mut Array3<f32>) -> Result<()> {
        let Some(mask) = self.levels.get(&res) else {
            warn!("No fill mask recorded for {}m, leaving data untouched", res);
            return Ok(());
        };
        if mask.dim() != data.dim() {
            return Err(Error::Processing(format!(
                "fill mask {:?} does not match the {:?} {}m level",
                mask.dim(),
                data.dim(),
                res
            )));
        }
        let fill = self.fill_val;
        Zip::from(data).and(mask).for_each(|v, &m| {
            if m {
                *v = fill;
            }
        });
        Ok(())
    }

    /// Put the fill value into a super-resolved `(height, width, C)` output
    /// using the finest-level mask.
    ///
    /// When the output is an exact integer multiple of the finest level the
    /// mask is enlarged by nearest-neighbour repetition. Otherwise it is
    /// applied unscaled over the extent both arrays share.
    pub fn restore_super_resolved(&self, data: &mut Array3<f32>) {
        let Some(plane) = self.finest_plane() else {
            return;
        };
        let (mh, mw) = plane.dim();
        let (h, w, _) = data.dim();
        let exact = mh > 0
            && mw > 0
            && h % mh == 0
            && w % mw == 0
            && h / mh == w / mw;

        let mask = if exact {
            repeat_nearest(plane.view(), h / mh)
        } else {
            warn!(
                "Output {}x{} is not an integer multiple of the {}x{} fill mask; applying it unscaled",
                h, w, mh, mw
            );
            plane
        };

        let (oh, ow) = (h.min(mask.nrows()), w.min(mask.ncols()));
        let fill = self.fill_val;
        for mut band in data.axis_iter_mut(Axis(2)) {
            Zip::from(band.slice_mut(s![..oh, ..ow]))
                .and(mask.slice(s![..oh, ..ow]))
                .for_each(|v, &m| {
                    if m {
                        *v = fill;
                    }
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;

    fn raster_with_holes() -> Raster {
        let mut fine = Array3::from_elem((6, 6, 2), 100.0f32);
        fine[[0, 0, 0]] = -1.0;
        fine[[5, 4, 1]] = -1.0;
        let mut coarse = Array3::from_elem((3, 3, 1), 50.0f32);
        coarse[[1, 1, 0]] = -1.0;
        let mut levels = BTreeMap::new();
        levels.insert(Resolution(10), fine);
        levels.insert(Resolution(20), coarse);
        Raster::new(levels, GeoReference::default()).unwrap()
    }

    #[test]
    fn original_levels_get_their_own_mask() {
        let raster = raster_with_holes();
        let mask = FillMask::record(&raster, -1.0);
        let mut coarse = Array3::from_elem((3, 3, 1), 7.0f32);
        mask.restore_level(Resolution(20), &mut coarse).unwrap();
        assert_eq!(coarse[[1, 1, 0]], -1.0);
        assert_eq!(coarse.iter().filter(|&&v| v == -1.0).count(), 1);
    }

    #[test]
    fn super_resolved_output_uses_finest_mask_on_every_band() {
        let raster = raster_with_holes();
        let mask = FillMask::record(&raster, -1.0);
        let mut sr = Array3::from_elem((6, 6, 3), 9.0f32);
        mask.restore_super_resolved(&mut sr);
        for b in 0..3 {
            assert_eq!(sr[[0, 0, b]], -1.0);
            assert_eq!(sr[[5, 4, b]], -1.0);
            assert_eq!(sr[[1, 1, b]], 9.0);
        }
    }

    #[test]
    fn integer_multiple_output_repeats_mask() {
        let raster = raster_with_holes();
        let mask = FillMask::record(&raster, -1.0);
        let mut sr = Array3::from_elem((12, 12, 1), 9.0f32);
        mask.restore_super_resolved(&mut sr);
        assert_eq!(sr[[0, 0, 0]], -1.0);
        assert_eq!(sr[[1, 1, 0]], -1.0);
        assert_eq!(sr[[2, 2, 0]], 9.0);
        assert_eq!(sr[[11, 9, 0]], -1.0);
    }

    #[test]
    fn non_multiple_output_falls_back_to_overlap() {
        let raster = raster_with_holes();
        let mask = FillMask::record(&raster, -1.0);
        let mut sr = Array3::from_elem((4, 9, 1), 9.0f32);
        mask.restore_super_resolved(&mut sr);
        assert_eq!(sr[[0, 0, 0]], -1.0);
        assert_eq!(sr.iter().filter(|&&v| v == -1.0).count(), 1);
    }
}
