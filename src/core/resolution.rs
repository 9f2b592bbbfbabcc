//! Static per-satellite resolution model: which resolution levels exist, the
//! ordered band set of each level, pixel-value semantics and the per-level
//! inference patch geometry defaults. Also hosts `ScaleTable`, the integer
//! ratios between the levels active in one run.
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Resolution;

/// Default inference patch edge (finest-level pixels) when a level has no entry.
pub const DEFAULT_PATCH_SIZE: usize = 128;
/// Default inference border (finest-level pixels) when a level has no entry.
pub const DEFAULT_BORDER: usize = 8;

/// Pixel-value semantics of a satellite product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSemantics {
    /// Lowest valid value after reconstruction
    pub min_val: f32,
    /// Highest valid value after reconstruction
    pub max_val: f32,
    /// Sentinel marking no-data pixels
    pub fill_val: f32,
    /// Fixed scalar every pixel is divided by before entering the model
    pub norm: f32,
}

impl Default for PixelSemantics {
    fn default() -> Self {
        Self {
            min_val: 0.0,
            max_val: 65536.0,
            fill_val: 0.0,
            norm: 2000.0,
        }
    }
}

/// Ordered band names of one resolution level. The order must match the
/// order the model was trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSet {
    pub resolution: Resolution,
    pub bands: Vec<String>,
}

impl BandSet {
    pub fn new(resolution: u32, bands: &[&str]) -> Self {
        Self {
            resolution: Resolution(resolution),
            bands: bands.iter().map(|b| b.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionModel {
    band_sets: BTreeMap<Resolution, BandSet>,
    band_desc: HashMap<String, String>,
    pixels: PixelSemantics,
    patch_sizes: BTreeMap<Resolution, usize>,
    borders: BTreeMap<Resolution, usize>,
}

impl ResolutionModel {
    /// Build a model from its band sets. Every level must be an integer
    /// multiple of the finest level.
    pub fn new(band_sets: Vec<BandSet>, pixels: PixelSemantics) -> Result<Self> {
        if band_sets.is_empty() {
            return Err(Error::config("a resolution model needs at least one band set"));
        }
        let band_sets: BTreeMap<Resolution, BandSet> = band_sets
            .into_iter()
            .map(|set| (set.resolution, set))
            .collect();
        for set in band_sets.values() {
            if set.is_empty() {
                return Err(Error::config(format!(
                    "resolution {}m has an empty band set",
                    set.resolution
                )));
            }
        }
        ScaleTable::new(band_sets.keys().copied())?;
        Ok(Self {
            band_sets,
            band_desc: HashMap::new(),
            pixels,
            patch_sizes: BTreeMap::new(),
            borders: BTreeMap::new(),
        })
    }

    pub fn with_descriptions(mut self, desc: &[(&str, &str)]) -> Self {
        self.band_desc = desc
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    /// Per-level inference patch size and border, in finest-level pixels.
    pub fn with_patch_geometry(mut self, geometry: &[(u32, usize, usize)]) -> Self {
        for &(res, patch, border) in geometry {
            self.patch_sizes.insert(Resolution(res), patch);
            self.borders.insert(Resolution(res), border);
        }
        self
    }

    pub fn pixels(&self) -> &PixelSemantics {
        &self.pixels
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.band_sets.keys().copied().collect()
    }

    pub fn finest(&self) -> Resolution {
        *self.band_sets.keys().next().expect("model has at least one level")
    }

    pub fn coarsest(&self) -> Resolution {
        *self.band_sets.keys().next_back().expect("model has at least one level")
    }

    pub fn band_set(&self, res: Resolution) -> Option<&BandSet> {
        self.band_sets.get(&res)
    }

    pub fn bands(&self, res: Resolution) -> Result<&[String]> {
        self.band_sets
            .get(&res)
            .map(|set| set.bands.as_slice())
            .ok_or_else(|| Error::config(format!("unknown resolution {}m", res)))
    }

    /// Human readable description of a band, falling back to its short name.
    pub fn band_description(&self, band: &str) -> String {
        self.band_desc
            .get(band)
            .cloned()
            .unwrap_or_else(|| band.to_string())
    }

    pub fn patch_size(&self, res: Resolution) -> usize {
        self.patch_sizes.get(&res).copied().unwrap_or(DEFAULT_PATCH_SIZE)
    }

    pub fn border(&self, res: Resolution) -> usize {
        self.borders.get(&res).copied().unwrap_or(DEFAULT_BORDER)
    }

    /// Levels taking part in a run whose coarsest level is `max_res`.
    /// `max_res` must be a known level coarser than the finest one.
    pub fn active_levels(&self, max_res: Resolution) -> Result<Vec<Resolution>> {
        if !self.band_sets.contains_key(&max_res) {
            return Err(Error::config(format!(
                "resolution {}m is not available, choose one of {:?}",
                max_res,
                self.resolutions().iter().map(|r| r.gsd()).collect::<Vec<_>>()
            )));
        }
        if max_res == self.finest() {
            return Err(Error::config(format!(
                "resolution {}m is already the finest level, nothing to super-resolve",
                max_res
            )));
        }
        let levels: Vec<Resolution> = self
            .band_sets
            .keys()
            .copied()
            .filter(|res| *res <= max_res)
            .collect();
        ScaleTable::new(levels.iter().copied())?;
        Ok(levels)
    }

    /// Levels that get super-resolved (every active level except the finest).
    pub fn target_levels(&self, max_res: Resolution) -> Result<Vec<Resolution>> {
        let finest = self.finest();
        Ok(self
            .active_levels(max_res)?
            .into_iter()
            .filter(|res| *res != finest)
            .collect())
    }
}

/// Integer ratios between the levels active in one run.
///
/// `scale(res)` is relative to the finest level (`{10: 1, 20: 2, 60: 6}`),
/// `inv_scale(res)` is relative to the coarsest level (`{10: 6, 20: 3, 60: 1}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleTable {
    finest: Resolution,
    coarsest: Resolution,
    levels: Vec<Resolution>,
}

impl ScaleTable {
    pub fn new<I: IntoIterator<Item = Resolution>>(levels: I) -> Result<Self> {
        let mut levels: Vec<Resolution> = levels.into_iter().collect();
        levels.sort();
        levels.dedup();
        let (finest, coarsest) = match (levels.first(), levels.last()) {
            (Some(f), Some(c)) => (*f, *c),
            _ => return Err(Error::config("no resolution levels given")),
        };
        if finest.gsd() == 0 {
            return Err(Error::config("resolution levels must be positive"));
        }
        for res in &levels {
            if res.gsd() % finest.gsd() != 0 {
                return Err(Error::config(format!(
                    "{}m is not an integer multiple of the finest level {}m",
                    res, finest
                )));
            }
            if coarsest.gsd() % res.gsd() != 0 {
                return Err(Error::config(format!(
                    "the coarsest level {}m is not an integer multiple of {}m",
                    coarsest, res
                )));
            }
        }
        Ok(Self {
            finest,
            coarsest,
            levels,
        })
    }

    pub fn finest(&self) -> Resolution {
        self.finest
    }

    pub fn coarsest(&self) -> Resolution {
        self.coarsest
    }

    pub fn levels(&self) -> &[Resolution] {
        &self.levels
    }

    pub fn scale(&self, res: Resolution) -> usize {
        (res.gsd() / self.finest.gsd()) as usize
    }

    pub fn inv_scale(&self, res: Resolution) -> usize {
        (self.coarsest.gsd() / res.gsd()) as usize
    }

    /// Scale of the coarsest level relative to the finest one.
    pub fn max_scale(&self) -> usize {
        self.scale(self.coarsest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel_like() -> ResolutionModel {
        ResolutionModel::new(
            vec![
                BandSet::new(10, &["B4", "B3"]),
                BandSet::new(20, &["B5"]),
                BandSet::new(60, &["B1", "B9"]),
            ],
            PixelSemantics::default(),
        )
        .unwrap()
        .with_patch_geometry(&[(20, 128, 8), (60, 192, 12)])
    }

    #[test]
    fn scale_table_ratios() {
        let table = ScaleTable::new([Resolution(60), Resolution(10), Resolution(20)]).unwrap();
        assert_eq!(table.finest(), Resolution(10));
        assert_eq!(table.coarsest(), Resolution(60));
        assert_eq!(table.scale(Resolution(20)), 2);
        assert_eq!(table.inv_scale(Resolution(20)), 3);
        assert_eq!(table.inv_scale(Resolution(10)), 6);
        assert_eq!(table.max_scale(), 6);
    }

    #[test]
    fn non_integer_ratio_is_configuration_error() {
        let err = ScaleTable::new([Resolution(10), Resolution(25)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // 30 is a multiple of 10 but not of 20
        let err = ScaleTable::new([Resolution(10), Resolution(20), Resolution(30)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn active_levels_respect_max_resolution() {
        let model = sentinel_like();
        assert_eq!(
            model.active_levels(Resolution(20)).unwrap(),
            vec![Resolution(10), Resolution(20)]
        );
        assert_eq!(model.target_levels(Resolution(60)).unwrap().len(), 2);
        assert!(model.active_levels(Resolution(10)).is_err());
        assert!(model.active_levels(Resolution(30)).is_err());
    }

    #[test]
    fn patch_geometry_defaults() {
        let model = sentinel_like();
        assert_eq!(model.patch_size(Resolution(60)), 192);
        assert_eq!(model.border(Resolution(20)), 8);
        assert_eq!(model.patch_size(Resolution(10)), DEFAULT_PATCH_SIZE);
        assert_eq!(model.band_description("B4"), "B4");
    }
}
