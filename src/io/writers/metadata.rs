use gdal::Dataset;
use gdal::Metadata;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::core::raster::GeoReference;
use crate::core::roi::Roi;
use crate::io::gdal::GdalError;
use crate::types::{Resolution, SatelliteKind};

/// Provenance of one super-resolved output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub satellite: SatelliteKind,
    pub tile: String,
    pub max_resolution: Resolution,
    pub roi: Roi,
    /// `(short name, description)` per output band
    pub bands: Vec<(String, String)>,
    pub conversion_tool: String,
    pub conversion_version: String,
    pub conversion_timestamp: String,
}

impl RunMetadata {
    pub fn new(
        satellite: SatelliteKind,
        tile: &Path,
        max_resolution: Resolution,
        roi: Roi,
        bands: Vec<(String, String)>,
    ) -> Self {
        Self {
            satellite,
            tile: tile.display().to_string(),
            max_resolution,
            roi,
            bands,
            conversion_tool: env!("CARGO_PKG_NAME").to_string(),
            conversion_version: env!("CARGO_PKG_VERSION").to_string(),
            conversion_timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Flat `KEY=value` items for the raster's default metadata domain.
    pub fn items(&self) -> Vec<(String, String)> {
        vec![
            ("SATELLITE".to_string(), self.satellite.to_string()),
            ("SOURCE_TILE".to_string(), self.tile.clone()),
            ("MAX_RESOLUTION".to_string(), self.max_resolution.to_string()),
            (
                "ROI".to_string(),
                format!(
                    "{},{},{},{}",
                    self.roi.xmin, self.roi.ymin, self.roi.xmax, self.roi.ymax
                ),
            ),
            (
                "BANDS".to_string(),
                self.bands
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ("CONVERSION_TOOL".to_string(), self.conversion_tool.clone()),
            (
                "CONVERSION_VERSION".to_string(),
                self.conversion_version.clone(),
            ),
            (
                "CONVERSION_TIMESTAMP".to_string(),
                self.conversion_timestamp.clone(),
            ),
        ]
    }
}

fn is_identity(gt: [f64; 6]) -> bool {
    gt == [0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

/// Set georeferencing and provenance items on a freshly created dataset.
pub fn embed_gdal_metadata(
    ds: &mut Dataset,
    georef: &GeoReference,
    meta: Option<&RunMetadata>,
) -> Result<(), GdalError> {
    // Only set projection if we also set a non-identity geotransform
    if !is_identity(georef.geotransform) {
        ds.set_geo_transform(&georef.geotransform)?;
        if !georef.projection.is_empty() {
            ds.set_projection(&georef.projection)?;
        }
    }
    if let Some(meta) = meta {
        for (key, value) in meta.items() {
            ds.set_metadata_item(&key, &value, "")?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Sidecar<'a> {
    #[serde(flatten)]
    meta: &'a RunMetadata,
    geotransform: [f64; 6],
    crs: &'a str,
}

/// Write `<output>.json` next to an output raster.
pub fn write_metadata_sidecar(
    output_path: &Path,
    meta: &RunMetadata,
    georef: &GeoReference,
) -> crate::Result<()> {
    let sidecar_path = output_path.with_extension("json");
    let sidecar = Sidecar {
        meta,
        geotransform: georef.geotransform,
        crs: &georef.projection,
    };
    let json_string = serde_json::to_string_pretty(&sidecar)?;
    std::fs::write(&sidecar_path, json_string)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(())
}
