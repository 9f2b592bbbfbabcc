//! Sentinel-2 L1C/L2A tiles read through GDAL's SENTINEL2 driver.
//!
//! A tile directory holds a `MTD_*.xml` product file whose sub-datasets group
//! the bands by resolution, possibly once per UTM zone when the tile straddles
//! a zone boundary.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{
    LevelSources, SatelliteAdapter, TileRead, active_scales, find_in_dir, match_bands, read_levels,
    resolve_roi,
};
use crate::core::resolution::{BandSet, PixelSemantics, ResolutionModel};
use crate::core::roi::{Roi, RoiRequest};
use crate::error::{Error, Result};
use crate::io::gdal::{GdalRasterReader, SubDataset};
use crate::types::{Resolution, SatelliteKind};

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("B1", "B1 (443 nm)"),
    ("B2", "B2 (490 nm)"),
    ("B3", "B3 (560 nm)"),
    ("B4", "B4 (665 nm)"),
    ("B5", "B5 (705 nm)"),
    ("B6", "B6 (740 nm)"),
    ("B7", "B7 (783 nm)"),
    ("B8", "B8 (842 nm)"),
    ("B8A", "B8A (865 nm)"),
    ("B9", "B9 (945 nm)"),
    ("B11", "B11 (1610 nm)"),
    ("B12", "B12 (2190 nm)"),
];

pub fn model() -> Result<ResolutionModel> {
    let model = ResolutionModel::new(
        vec![
            BandSet::new(10, &["B4", "B3", "B2", "B8"]),
            BandSet::new(20, &["B5", "B6", "B7", "B8A", "B11", "B12"]),
            BandSet::new(60, &["B1", "B9"]),
        ],
        PixelSemantics::default(),
    )?;
    Ok(model
        .with_descriptions(DESCRIPTIONS)
        .with_patch_geometry(&[(20, 128, 8), (60, 192, 12)]))
}

#[derive(Debug, Clone)]
pub struct Sentinel2 {
    model: ResolutionModel,
    utm_zone: Option<String>,
}

impl Sentinel2 {
    pub fn new(utm_zone: Option<String>) -> Result<Self> {
        Ok(Self {
            model: model()?,
            utm_zone,
        })
    }
}

/// `"UTM 30N"` part of a sub-dataset description, or `""` when absent.
pub fn utm_label(description: &str) -> &str {
    description
        .find("UTM")
        .map(|i| &description[i..])
        .unwrap_or("")
}

/// Group sub-datasets by the `"{res}m resolution"` marker in their
/// description. Unmatched ones go to `unknown`.
pub fn group_subdatasets(
    subdatasets: &[SubDataset],
    levels: &[Resolution],
) -> (BTreeMap<Resolution, Vec<SubDataset>>, Vec<SubDataset>) {
    let mut sets: BTreeMap<Resolution, Vec<SubDataset>> =
        levels.iter().map(|r| (*r, Vec::new())).collect();
    let mut unknown = Vec::new();
    for sd in subdatasets {
        let level = levels
            .iter()
            .find(|res| sd.description.contains(&format!("{}m resolution", res.gsd())));
        match level {
            Some(res) => sets.entry(*res).or_default().push(sd.clone()),
            None => unknown.push(sd.clone()),
        }
    }
    (sets, unknown)
}

/// Pick the zone variant to process among `(utm label, resolved ROI)`
/// candidates: the forced zone when it resolves, else the largest ROI.
pub fn select_variant(candidates: &[(String, Option<Roi>)], forced: Option<&str>) -> Option<usize> {
    if let Some(zone) = forced {
        if let Some(i) = candidates
            .iter()
            .position(|(utm, roi)| utm == zone && roi.is_some())
        {
            return Some(i);
        }
        warn!("UTM zone {:?} not found in tile, using the largest coverage", zone);
    }
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, (_, roi))| roi.map(|r| (i, r.area())))
        .fold(None, |best: Option<(usize, usize)>, (i, area)| match best {
            Some((_, a)) if a >= area => best,
            _ => Some((i, area)),
        })
        .map(|(i, _)| i)
}

/// Sub-dataset of one level's `set` that belongs to the chosen variant:
/// same UTM label, else the same position as the chosen finest-level
/// variant, else the only entry.
pub fn level_subdataset<'a>(
    set: &'a [SubDataset],
    utm: &str,
    finest_position: Option<usize>,
) -> Option<&'a SubDataset> {
    if !utm.is_empty() {
        if let Some(sd) = set.iter().find(|sd| sd.description.contains(utm)) {
            return Some(sd);
        }
    }
    match finest_position {
        Some(i) => set.get(i),
        None if set.len() == 1 => set.first(),
        None => None,
    }
}

fn locate_metadata(tile: &Path) -> Result<PathBuf> {
    if tile.is_file() {
        return Ok(tile.to_path_buf());
    }
    find_in_dir(tile, |name| name.starts_with("MTD_") && name.ends_with("xml"))?
        .ok_or_else(|| Error::config(format!("no MTD_*.xml product file in {:?}", tile)))
}

impl SatelliteAdapter for Sentinel2 {
    fn kind(&self) -> SatelliteKind {
        SatelliteKind::Sentinel2
    }

    fn model(&self) -> &ResolutionModel {
        &self.model
    }

    fn read_bands(&self, tile: &Path, request: &RoiRequest, max_res: Resolution) -> Result<TileRead> {
        let (levels, scales) = active_scales(&self.model, max_res)?;
        let product = GdalRasterReader::open(locate_metadata(tile)?)?;
        let (sets, unknown) = group_subdatasets(&product.subdatasets(), &self.model.resolutions());

        let finest = self.model.finest();
        let finest_count = sets.get(&finest).map_or(0, Vec::len);
        let variants: Vec<SubDataset> = sets
            .get(&finest)
            .into_iter()
            .flatten()
            .chain(unknown.iter())
            .cloned()
            .collect();

        let mut candidates = Vec::with_capacity(variants.len());
        for sd in &variants {
            let reader = GdalRasterReader::open_name(&sd.name)?;
            let size = (reader.metadata.size_x, reader.metadata.size_y);
            let roi = match resolve_roi(request, &reader.metadata.georef(), size, scales.max_scale()) {
                Ok(roi) => Some(roi),
                Err(Error::EmptyRegion(msg)) => {
                    debug!("{}: {}", sd.description, msg);
                    None
                }
                Err(e) => return Err(e),
            };
            candidates.push((utm_label(&sd.description).to_string(), roi));
        }

        let chosen = select_variant(&candidates, self.utm_zone.as_deref()).ok_or_else(|| {
            Error::EmptyRegion("invalid region of interest / UTM zone combination".into())
        })?;
        let (utm, roi) = candidates[chosen].clone();
        let finest_position = (chosen < finest_count).then_some(chosen);
        let roi = roi.ok_or_else(|| Error::EmptyRegion("selected UTM zone has no coverage".into()))?;
        info!(
            "Selected UTM zone {:?}, pixel region x [{}, {}] y [{}, {}] ({}x{})",
            utm,
            roi.xmin,
            roi.xmax,
            roi.ymin,
            roi.ymax,
            roi.width(),
            roi.height()
        );

        let mut readers = Vec::with_capacity(levels.len());
        for res in &levels {
            let set = sets.get(res).map(Vec::as_slice).unwrap_or_default();
            let sd = level_subdataset(set, &utm, finest_position).ok_or_else(|| {
                Error::MissingBand {
                    resolution: *res,
                    expected: self.model.bands(*res).map(|b| b.to_vec()).unwrap_or_default(),
                    found: Vec::new(),
                }
            })?;
            debug!("{}m bands from {}", res, sd.description);
            readers.push((*res, GdalRasterReader::open_name(&sd.name)?));
        }

        let mut sources: Vec<(Resolution, LevelSources<'_>)> = Vec::with_capacity(readers.len());
        for (res, reader) in &readers {
            let indices = match_bands(*res, self.model.bands(*res)?, &reader.metadata.band_descriptions)?;
            sources.push((*res, indices.into_iter().map(|i| (reader, i)).collect()));
        }

        let georef = readers[0].1.metadata.georef();
        let raster = read_levels(&sources, &roi, &scales, &georef)?;
        Ok(TileRead { raster, roi })
    }
}
