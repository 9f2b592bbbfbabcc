//! In-memory multi-resolution raster and its georeference.
//!
//! A `Raster` maps every active resolution level to a dense `(height, width,
//! channel)` array. All levels cover the same ground footprint, so each level's
//! pixel dimensions equal the finest level's divided by its scale. The
//! `GeoReference` is always expressed at the finest level.
use std::collections::BTreeMap;

use ndarray::{Array3, s};
use serde::{Deserialize, Serialize};

use crate::core::resolution::ScaleTable;
use crate::error::{Error, Result};
use crate::types::Resolution;

/// Affine georeference (GDAL geotransform order) plus projection WKT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    /// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`
    pub geotransform: [f64; 6],
    pub projection: String,
}

impl Default for GeoReference {
    fn default() -> Self {
        Self {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            projection: String::new(),
        }
    }
}

impl GeoReference {
    pub fn new(geotransform: [f64; 6], projection: impl Into<String>) -> Self {
        Self {
            geotransform,
            projection: projection.into(),
        }
    }

    pub fn pixel_to_geo(&self, px: f64, py: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        (
            gt[0] + px * gt[1] + py * gt[2],
            gt[3] + px * gt[4] + py * gt[5],
        )
    }

    /// Invert the affine transform (2x2 linear solve on the rotation/scale terms).
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let [x0, a, b, y0, d, e] = self.geotransform;
        let det = a * e - d * b;
        if det == 0.0 || !det.is_finite() {
            return Err(Error::InvalidRoi(format!(
                "geotransform {:?} is not invertible",
                self.geotransform
            )));
        }
        let xp = x - x0;
        let yp = y - y0;
        Ok(((e * xp - b * yp) / det, (-d * xp + a * yp) / det))
    }

    /// Georeference whose origin is the pixel `(xoff, yoff)` of this one.
    pub fn shifted(&self, xoff: usize, yoff: usize) -> Self {
        let (ox, oy) = self.pixel_to_geo(xoff as f64, yoff as f64);
        let mut gt = self.geotransform;
        gt[0] = ox;
        gt[3] = oy;
        Self {
            geotransform: gt,
            projection: self.projection.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Raster {
    levels: BTreeMap<Resolution, Array3<f32>>,
    georef: GeoReference,
}

impl Raster {
    /// Build a raster, checking the scale invariant and that every level
    /// covers the same footprint as the finest one.
    pub fn new(levels: BTreeMap<Resolution, Array3<f32>>, georef: GeoReference) -> Result<Self> {
        let scales = ScaleTable::new(levels.keys().copied())?;
        let finest = &levels[&scales.finest()];
        let (fh, fw, _) = finest.dim();
        for (res, data) in &levels {
            let (h, w, c) = data.dim();
            let s = scales.scale(*res);
            if h * s != fh || w * s != fw {
                return Err(Error::config(format!(
                    "level {}m has shape {}x{}, expected {}x{} (finest {}x{} / {})",
                    res,
                    h,
                    w,
                    fh / s,
                    fw / s,
                    fh,
                    fw,
                    s
                )));
            }
            if c == 0 {
                return Err(Error::config(format!("level {}m has no bands", res)));
            }
        }
        Ok(Self { levels, georef })
    }

    pub fn scales(&self) -> ScaleTable {
        // Validated in `new`
        ScaleTable::new(self.levels.keys().copied()).expect("raster levels are consistent")
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.levels.keys().copied().collect()
    }

    pub fn finest(&self) -> Resolution {
        *self.levels.keys().next().expect("raster has at least one level")
    }

    pub fn coarsest(&self) -> Resolution {
        *self.levels.keys().next_back().expect("raster has at least one level")
    }

    pub fn level(&self, res: Resolution) -> Option<&Array3<f32>> {
        self.levels.get(&res)
    }

    pub fn levels(&self) -> &BTreeMap<Resolution, Array3<f32>> {
        &self.levels
    }

    /// `(height, width)` of the finest level.
    pub fn size(&self) -> (usize, usize) {
        let (h, w, _) = self.levels[&self.finest()].dim();
        (h, w)
    }

    /// Sub-raster with the levels not coarser than `max_res`.
    pub fn restricted(&self, max_res: Resolution) -> Result<Raster> {
        let levels: BTreeMap<Resolution, Array3<f32>> = self
            .levels
            .iter()
            .filter(|(res, _)| **res <= max_res)
            .map(|(res, data)| (*res, data.clone()))
            .collect();
        if levels.is_empty() {
            return Err(Error::config(format!(
                "no level at or below {}m in raster",
                max_res
            )));
        }
        Raster::new(levels, self.georef.clone())
    }

    /// Crop every level so the coarsest level's sides are multiples of `factor`,
    /// keeping the footprint aligned across levels.
    pub fn cropped_to_coarsest_multiple(&self, factor: usize) -> Result<Raster> {
        let scales = self.scales();
        let (ch, cw, _) = self.levels[&scales.coarsest()].dim();
        let (nh, nw) = ((ch / factor) * factor, (cw / factor) * factor);
        if nh == 0 || nw == 0 {
            return Err(Error::EmptyRegion(format!(
                "coarsest level {}x{} is smaller than the scale factor {}",
                ch, cw, factor
            )));
        }
        let levels = self
            .levels
            .iter()
            .map(|(res, data)| {
                let inv = scales.inv_scale(*res);
                (*res, data.slice(s![..nh * inv, ..nw * inv, ..]).to_owned())
            })
            .collect();
        Raster::new(levels, self.georef.clone())
    }

    /// True when the finest level carries no data at all (all zero or all fill).
    pub fn is_empty(&self, fill_val: f32) -> bool {
        self.levels[&self.finest()]
            .iter()
            .all(|&v| v == 0.0 || v == fill_val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn levels(fine: (usize, usize), coarse_res: u32) -> BTreeMap<Resolution, Array3<f32>> {
        let s = (coarse_res / 10) as usize;
        let mut map = BTreeMap::new();
        map.insert(Resolution(10), Array3::<f32>::zeros((fine.0, fine.1, 2)));
        map.insert(
            Resolution(coarse_res),
            Array3::<f32>::zeros((fine.0 / s, fine.1 / s, 1)),
        );
        map
    }

    #[test]
    fn geo_pixel_roundtrip_with_rotation() {
        let geo = GeoReference::new([500000.0, 10.0, 0.5, 4600000.0, 0.25, -10.0], "");
        let (x, y) = geo.pixel_to_geo(123.0, 45.0);
        let (px, py) = geo.geo_to_pixel(x, y).unwrap();
        assert_abs_diff_eq!(px, 123.0, epsilon = 1e-6);
        assert_abs_diff_eq!(py, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn singular_geotransform_is_rejected() {
        let geo = GeoReference::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0], "");
        assert!(matches!(geo.geo_to_pixel(1.0, 1.0), Err(Error::InvalidRoi(_))));
    }

    #[test]
    fn shifted_moves_origin() {
        let geo = GeoReference::new([1000.0, 10.0, 0.0, 2000.0, 0.0, -10.0], "EPSG:32630");
        let moved = geo.shifted(6, 12);
        assert_eq!(moved.geotransform[0], 1060.0);
        assert_eq!(moved.geotransform[3], 1880.0);
        assert_eq!(moved.projection, "EPSG:32630");
    }

    #[test]
    fn mismatched_level_shapes_are_rejected() {
        let mut map = levels((60, 60), 20);
        map.insert(Resolution(20), Array3::<f32>::zeros((31, 30, 1)));
        assert!(matches!(
            Raster::new(map, GeoReference::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn crop_keeps_levels_aligned() {
        let raster = Raster::new(levels((66, 60), 30), GeoReference::default()).unwrap();
        let cropped = raster.cropped_to_coarsest_multiple(3).unwrap();
        assert_eq!(cropped.level(Resolution(30)).unwrap().dim(), (21, 18, 1));
        assert_eq!(cropped.level(Resolution(10)).unwrap().dim(), (63, 54, 2));
    }
}
