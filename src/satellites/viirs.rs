//! VIIRS surface reflectance granules (VNP09 HDF files).
//!
//! Each band is its own HDF sub-dataset. The granules carry no usable
//! georeference, so outputs get a fixed 375m UTM 30N placeholder.
use std::path::Path;

use tracing::info;

use super::{LevelSources, SatelliteAdapter, TileRead, active_scales, read_levels, resolve_roi};
use crate::core::raster::GeoReference;
use crate::core::resolution::{BandSet, PixelSemantics, ResolutionModel};
use crate::core::roi::RoiRequest;
use crate::error::{Error, Result};
use crate::io::gdal::{GdalRasterReader, SubDataset};
use crate::types::{Resolution, SatelliteKind};

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("I1", "375m Surface Reflectance Band I1 (16-bit integer)"),
    ("I2", "375m Surface Reflectance Band I2 (16-bit integer)"),
    ("I3", "375m Surface Reflectance Band I3 (16-bit integer)"),
    ("M1", "750m Surface Reflectance Band M1 (16-bit integer)"),
    ("M2", "750m Surface Reflectance Band M2 (16-bit integer)"),
    ("M3", "750m Surface Reflectance Band M3 (16-bit integer)"),
    ("M4", "750m Surface Reflectance Band M4 (16-bit integer)"),
    ("M5", "750m Surface Reflectance Band M5 (16-bit integer)"),
    ("M7", "750m Surface Reflectance Band M7 (16-bit integer)"),
    ("M8", "750m Surface Reflectance Band M8 (16-bit integer)"),
    ("M10", "750m Surface Reflectance Band M10 (16-bit integer)"),
    ("M11", "750m Surface Reflectance Band M11 (16-bit integer)"),
];

pub const PIXELS: PixelSemantics = PixelSemantics {
    min_val: -100.0,
    max_val: 16000.0,
    fill_val: -28672.0,
    norm: 2000.0,
};

const GEOTRANSFORM: [f64; 6] = [0.0, 375.0, 0.0, 0.0, 0.0, -375.0];

const UTM_30N_WKT: &str = concat!(
    r#"PROJCS["WGS 84 / UTM zone 30N",GEOGCS["WGS 84",DATUM["WGS_1984","#,
    r#"SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],"#,
    r#"PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],"#,
    r#"AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],"#,
    r#"PARAMETER["central_meridian",-3],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],"#,
    r#"PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],"#,
    r#"AXIS["Northing",NORTH],AUTHORITY["EPSG","32630"]]"#
);

/// Placeholder georeference attached to every VIIRS output.
pub fn fixed_georef() -> GeoReference {
    GeoReference::new(GEOTRANSFORM, UTM_30N_WKT)
}

pub fn model() -> Result<ResolutionModel> {
    let model = ResolutionModel::new(
        vec![
            BandSet::new(375, &["I1", "I2", "I3"]),
            BandSet::new(
                750,
                &["M1", "M2", "M3", "M4", "M5", "M7", "M8", "M10", "M11"],
            ),
        ],
        PIXELS,
    )?;
    Ok(model
        .with_descriptions(DESCRIPTIONS)
        .with_patch_geometry(&[(750, 128, 8)]))
}

/// Sub-dataset descriptions look like `[3232x6400] 375m Surface ... (16-bit integer)`;
/// the band description is what follows the dimensions.
pub fn band_label(description: &str) -> &str {
    description
        .split_once("] ")
        .map(|(_, rest)| rest)
        .unwrap_or(description)
}

/// Sub-dataset names for `bands`, in order.
pub fn match_subdatasets<'a>(
    res: Resolution,
    bands: &[String],
    model: &ResolutionModel,
    subdatasets: &'a [SubDataset],
) -> Result<Vec<&'a SubDataset>> {
    bands
        .iter()
        .map(|band| {
            let wanted = model.band_description(band);
            subdatasets
                .iter()
                .find(|sd| band_label(&sd.description) == wanted)
                .ok_or_else(|| Error::MissingBand {
                    resolution: res,
                    expected: bands.to_vec(),
                    found: subdatasets
                        .iter()
                        .map(|sd| band_label(&sd.description).to_string())
                        .collect(),
                })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Viirs {
    model: ResolutionModel,
}

impl Viirs {
    pub fn new() -> Result<Self> {
        Ok(Self { model: model()? })
    }
}

impl SatelliteAdapter for Viirs {
    fn kind(&self) -> SatelliteKind {
        SatelliteKind::Viirs
    }

    fn model(&self) -> &ResolutionModel {
        &self.model
    }

    fn read_bands(&self, tile: &Path, request: &RoiRequest, max_res: Resolution) -> Result<TileRead> {
        let (levels, scales) = active_scales(&self.model, max_res)?;
        let granule = GdalRasterReader::open(tile)?;
        let subdatasets = granule.subdatasets();

        let mut readers: Vec<(Resolution, Vec<GdalRasterReader>)> = Vec::with_capacity(levels.len());
        for res in &levels {
            let bands = self.model.bands(*res)?;
            let level = match_subdatasets(*res, bands, &self.model, &subdatasets)?
                .into_iter()
                .map(|sd| GdalRasterReader::open_name(&sd.name))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            readers.push((*res, level));
        }

        let finest = &readers[0].1[0];
        let georef = fixed_georef();
        let size = (finest.metadata.size_x, finest.metadata.size_y);
        let roi = resolve_roi(request, &georef, size, scales.max_scale())?;
        info!(
            "Selected pixel region x [{}, {}] y [{}, {}] ({}x{})",
            roi.xmin,
            roi.xmax,
            roi.ymin,
            roi.ymax,
            roi.width(),
            roi.height()
        );

        let sources: Vec<(Resolution, LevelSources<'_>)> = readers
            .iter()
            .map(|(res, level)| (*res, level.iter().map(|r| (r, 1)).collect()))
            .collect();
        let raster = read_levels(&sources, &roi, &scales, &georef)?;
        Ok(TileRead { raster, roi })
    }
}
