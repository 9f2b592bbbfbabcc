use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::raster::GeoReference;

/// Errors encountered when using GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Window ({0}, {1}) {2}x{3} lies outside the {4}x{5} raster")]
    WindowOutOfBounds(usize, usize, usize, usize, usize, usize),
}

/// Metadata extracted from a GDAL-supported dataset
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection in WKT format
    pub projection: String,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
    /// Per-band descriptions, in band order
    pub band_descriptions: Vec<String>,
}

impl GdalMetadata {
    pub fn georef(&self) -> GeoReference {
        GeoReference::new(self.geotransform, self.projection.clone())
    }
}

/// A sub-dataset advertised by a container file (SAFE, HDF, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDataset {
    pub name: String,
    pub description: String,
}

/// Reader for generic geospatial formats via GDAL
pub struct GdalRasterReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

/// `EPSG:xxxx` from the last authority tag of a WKT string.
pub fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

/// Pair up `SUBDATASET_n_NAME` / `SUBDATASET_n_DESC` entries, in index order.
pub fn parse_subdatasets(entries: &[String]) -> Vec<SubDataset> {
    let mut names: HashMap<usize, String> = HashMap::new();
    let mut descs: HashMap<usize, String> = HashMap::new();
    for entry in entries {
        let Some((key, val)) = entry.split_once('=') else {
            continue;
        };
        let Some(rest) = key.strip_prefix("SUBDATASET_") else {
            continue;
        };
        let Some((idx, kind)) = rest.split_once('_') else {
            continue;
        };
        let Ok(idx) = idx.parse::<usize>() else {
            continue;
        };
        match kind {
            "NAME" => {
                names.insert(idx, val.to_string());
            }
            "DESC" => {
                descs.insert(idx, val.to_string());
            }
            _ => {}
        }
    }
    let mut indices: Vec<usize> = names.keys().copied().collect();
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|i| SubDataset {
            name: names[&i].clone(),
            description: descs.get(&i).cloned().unwrap_or_default(),
        })
        .collect()
}

impl GdalRasterReader {
    /// Open a GDAL-supported dataset (GeoTIFF, SAFE metadata, HDF sub-dataset, ENVI, ...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        Self::open_name(&path.as_ref().to_string_lossy())
    }

    /// Open by GDAL dataset name, which may be a sub-dataset string such as
    /// `SENTINEL2_L1C:/path/MTD_MSIL1C.xml:10m:EPSG_32630`.
    pub fn open_name(name: &str) -> Result<Self, GdalError> {
        let dataset = Dataset::open(name)?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        let geotransform = match dataset.geo_transform() {
            Ok(gt) => gt,
            Err(_) => [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let mut projection = dataset.projection();
        if projection.is_empty() {
            // Fallback to GCP projection if available
            if let Some(gcp_proj) = dataset.gcp_projection() {
                if !gcp_proj.is_empty() {
                    projection = gcp_proj;
                }
            }
        }
        // Collect metadata entries (domain "")
        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        let mut band_descriptions = Vec::with_capacity(bands);
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            band_descriptions.push(band.description().unwrap_or_default());
        }
        debug!(
            "Opened {} ({}x{}, {} bands, {})",
            name,
            size_x,
            size_y,
            bands,
            parse_epsg(&projection).unwrap_or_else(|| "no EPSG code".into())
        );
        Ok(GdalRasterReader {
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                metadata: metadata_map,
                band_descriptions,
            },
        })
    }

    pub fn subdatasets(&self) -> Vec<SubDataset> {
        self.dataset
            .metadata_domain("SUBDATASETS")
            .map(|entries| parse_subdatasets(&entries))
            .unwrap_or_default()
    }

    /// Read a window of one band (1-based index) as `(height, width)`.
    pub fn read_window(
        &self,
        index: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array2<f32>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let (xoff, yoff) = offset;
        let (cols, rows) = size;
        if xoff + cols > self.metadata.size_x || yoff + rows > self.metadata.size_y {
            return Err(GdalError::WindowOutOfBounds(
                xoff,
                yoff,
                cols,
                rows,
                self.metadata.size_x,
                self.metadata.size_y,
            ));
        }
        let band = self.dataset.rasterband(index)?;
        let buf = band.read_as::<f32>((xoff as isize, yoff as isize), size, size, None)?;
        let data_vec = buf.data().to_vec();
        let got = data_vec.len();
        Array2::from_shape_vec((rows, cols), data_vec)
            .map_err(|_| GdalError::DimensionMismatch(cols, rows, got, 1))
    }
}

/// Transform WGS84 lon/lat points into the CRS described by `wkt`.
pub fn lonlat_to_crs(wkt: &str, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, GdalError> {
    let mut source = SpatialRef::from_epsg(4326)?;
    source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let mut target = SpatialRef::from_wkt(wkt)?;
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let transform = CoordTransform::new(&source, &target)?;

    let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let mut zs = vec![0.0; points.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
    Ok(xs.into_iter().zip(ys).collect())
}

/// Whether GDAL has a driver named `name` that can create new files.
pub fn driver_can_create(name: &str) -> bool {
    match DriverManager::get_driver_by_name(name) {
        Ok(driver) => driver
            .metadata_item("DCAP_CREATE", "")
            .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdatasets_are_paired_by_index() {
        let entries = vec![
            "SUBDATASET_2_NAME=HDF4_EOS:EOS_GRID:\"f.hdf\":grid:I2".to_string(),
            "SUBDATASET_1_DESC=[2400x2400] I1 (16-bit integer)".to_string(),
            "SUBDATASET_1_NAME=HDF4_EOS:EOS_GRID:\"f.hdf\":grid:I1".to_string(),
            "SUBDATASET_10_NAME=x".to_string(),
            "SOMETHING_ELSE=1".to_string(),
        ];
        let sds = parse_subdatasets(&entries);
        assert_eq!(sds.len(), 3);
        assert!(sds[0].name.ends_with("I1"));
        assert_eq!(sds[0].description, "[2400x2400] I1 (16-bit integer)");
        assert_eq!(sds[1].description, "");
        assert_eq!(sds[2].name, "x");
    }

    #[test]
    fn epsg_from_wkt() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 30N",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],AUTHORITY["EPSG","32630"]]"#;
        assert_eq!(parse_epsg(wkt).as_deref(), Some("EPSG:32630"));
        assert_eq!(parse_epsg("LOCAL_CS[]"), None);
    }
}
