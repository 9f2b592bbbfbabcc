//! Satellite families: each one pairs a `ResolutionModel` with a
//! `SatelliteAdapter` that knows how to pull the model's bands out of a tile
//! on disk. A `SatelliteProfile` bundles both and is passed explicitly to
//! every entry point.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::raster::{GeoReference, Raster};
use crate::core::resolution::{ResolutionModel, ScaleTable};
use crate::core::roi::{Roi, RoiRequest, projected_to_pixel_corners, resolve_pixel_roi};
use crate::error::{Error, Result};
use crate::io::gdal::{GdalRasterReader, lonlat_to_crs};
use crate::types::{Resolution, SatelliteKind};

pub mod landsat8;
pub mod sentinel2;
pub mod viirs;

pub use landsat8::Landsat8;
pub use sentinel2::Sentinel2;
pub use viirs::Viirs;

/// Bands of one tile read over a resolved ROI.
#[derive(Debug, Clone)]
pub struct TileRead {
    /// Levels up to the requested maximum; georeference shifted to the ROI corner
    pub raster: Raster,
    pub roi: Roi,
}

/// Reads the bands of one satellite family.
pub trait SatelliteAdapter: Send + Sync {
    fn kind(&self) -> SatelliteKind;

    fn model(&self) -> &ResolutionModel;

    /// Read every level not coarser than `max_res` over the resolved ROI.
    fn read_bands(&self, tile: &Path, roi: &RoiRequest, max_res: Resolution) -> Result<TileRead>;
}

/// Adapter knobs that are not part of the resolution model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Coordinate-system variant to force when a tile holds several (e.g. `UTM 31N`)
    pub utm_zone: Option<String>,
}

type AdapterFactory = fn(&AdapterOptions) -> Result<Box<dyn SatelliteAdapter>>;

fn sentinel2_factory(options: &AdapterOptions) -> Result<Box<dyn SatelliteAdapter>> {
    Ok(Box::new(Sentinel2::new(options.utm_zone.clone())?))
}

fn landsat8_factory(_: &AdapterOptions) -> Result<Box<dyn SatelliteAdapter>> {
    Ok(Box::new(Landsat8::new()?))
}

fn viirs_factory(_: &AdapterOptions) -> Result<Box<dyn SatelliteAdapter>> {
    Ok(Box::new(Viirs::new()?))
}

/// Known satellite families and how to build them.
pub const REGISTRY: &[(SatelliteKind, AdapterFactory)] = &[
    (SatelliteKind::Sentinel2, sentinel2_factory),
    (SatelliteKind::Landsat8, landsat8_factory),
    (SatelliteKind::Viirs, viirs_factory),
];

/// The active satellite of one request.
pub struct SatelliteProfile {
    adapter: Box<dyn SatelliteAdapter>,
}

impl std::fmt::Debug for SatelliteProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatelliteProfile")
            .field("kind", &self.adapter.kind())
            .field("levels", &self.adapter.model().resolutions())
            .finish()
    }
}

impl SatelliteProfile {
    pub fn new(kind: SatelliteKind, options: &AdapterOptions) -> Result<Self> {
        let factory = REGISTRY
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, f)| *f)
            .ok_or_else(|| Error::config(format!("no adapter registered for {}", kind)))?;
        Ok(Self {
            adapter: factory(options)?,
        })
    }

    /// Profile around a custom adapter.
    pub fn from_adapter(adapter: Box<dyn SatelliteAdapter>) -> Self {
        Self { adapter }
    }

    pub fn kind(&self) -> SatelliteKind {
        self.adapter.kind()
    }

    pub fn model(&self) -> &ResolutionModel {
        self.adapter.model()
    }

    pub fn adapter(&self) -> &dyn SatelliteAdapter {
        self.adapter.as_ref()
    }

    pub fn read_bands(&self, tile: &Path, roi: &RoiRequest, max_res: Resolution) -> Result<TileRead> {
        self.adapter.read_bands(tile, roi, max_res)
    }
}

/// Pixel corners for a request against a finest-level georeference.
pub fn request_corners(request: &RoiRequest, georef: &GeoReference) -> Result<Option<[i64; 4]>> {
    match *request {
        RoiRequest::Full => Ok(None),
        RoiRequest::Pixels { x1, y1, x2, y2 } => Ok(Some([x1, y1, x2, y2])),
        RoiRequest::LonLat {
            lon1,
            lat1,
            lon2,
            lat2,
        } => {
            if georef.projection.is_empty() {
                return Err(Error::InvalidRoi(
                    "raster has no projection to place a lon/lat region".into(),
                ));
            }
            let projected = lonlat_to_crs(&georef.projection, &[(lon1, lat1), (lon2, lat2)])?;
            let corners = projected_to_pixel_corners(
                georef,
                [projected[0].0, projected[0].1, projected[1].0, projected[1].1],
            )?;
            Ok(Some(corners))
        }
    }
}

/// Resolve a request into a snapped ROI for a finest level of `size` `(width, height)`.
pub fn resolve_roi(
    request: &RoiRequest,
    georef: &GeoReference,
    size: (usize, usize),
    snap: usize,
) -> Result<Roi> {
    let corners = request_corners(request, georef)?;
    resolve_pixel_roi(corners, size, snap)
}

/// Scale table of the levels taking part in a run up to `max_res`.
pub fn active_scales(model: &ResolutionModel, max_res: Resolution) -> Result<(Vec<Resolution>, ScaleTable)> {
    let levels = model.active_levels(max_res)?;
    let scales = ScaleTable::new(levels.iter().copied())?;
    Ok((levels, scales))
}

/// Where the channels of one level come from: `(reader, 1-based band index)`
/// in model band order.
pub type LevelSources<'a> = Vec<(&'a GdalRasterReader, usize)>;

/// Read the ROI window of every level and build the raster, georeferenced at
/// the ROI corner.
pub fn read_levels(
    sources: &[(Resolution, LevelSources<'_>)],
    roi: &Roi,
    scales: &ScaleTable,
    georef: &GeoReference,
) -> Result<Raster> {
    let mut levels = std::collections::BTreeMap::new();
    for (res, channels) in sources {
        let (xoff, yoff, w, h) = roi.window(scales.scale(*res));
        info!(
            "Loading {}m: {} bands, window ({}, {}) {}x{}",
            res,
            channels.len(),
            xoff,
            yoff,
            w,
            h
        );
        let mut data = ndarray::Array3::<f32>::zeros((h, w, channels.len()));
        for (c, (reader, index)) in channels.iter().enumerate() {
            let plane = reader.read_window(*index, (xoff, yoff), (w, h))?;
            data.index_axis_mut(ndarray::Axis(2), c).assign(&plane);
        }
        levels.insert(*res, data);
    }
    Raster::new(levels, georef.shifted(roi.xmin, roi.ymin))
}

/// `"B4, central wavelength 665 nm"` -> `"B4 (665 nm)"`; anything else as is.
pub fn short_description(description: &str) -> String {
    const MARKER: &str = ", central wavelength ";
    if let Some(pos) = description.find(MARKER) {
        let rest = &description[pos + MARKER.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && rest[digits.len()..].starts_with(" nm") {
            return format!("{} ({} nm)", &description[..pos], digits);
        }
    }
    description.to_string()
}

/// Band short name: text up to the first comma, else up to the first space,
/// else the first three characters.
pub fn short_name(description: &str) -> String {
    if let Some(pos) = description.find(',') {
        return description[..pos].to_string();
    }
    if let Some(pos) = description.find(' ') {
        return description[..pos].to_string();
    }
    description.chars().take(3).collect()
}

/// Band indices (1-based) of `expected` among `descriptions`, matched by short name.
pub fn match_bands(
    res: Resolution,
    expected: &[String],
    descriptions: &[String],
) -> Result<Vec<usize>> {
    let found: Vec<String> = descriptions
        .iter()
        .map(|d| short_name(&short_description(d)))
        .collect();
    debug!("{}m bands found: {:?}", res, found);
    expected
        .iter()
        .map(|band| {
            found
                .iter()
                .position(|f| f == band)
                .map(|i| i + 1)
                .ok_or_else(|| Error::MissingBand {
                    resolution: res,
                    expected: expected.to_vec(),
                    found: found.clone(),
                })
        })
        .collect()
}

/// First directory entry whose file name satisfies `pred`, in name order.
pub fn find_in_dir(dir: &Path, pred: impl Fn(&str) -> bool) -> Result<Option<PathBuf>> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(&pred))
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
