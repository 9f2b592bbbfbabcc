//! Landsat-8 scenes: one GeoTIFF per band named after the product id found
//! in the scene's `*MTL.txt` metadata file.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{
    LevelSources, SatelliteAdapter, TileRead, active_scales, find_in_dir, read_levels, resolve_roi,
};
use crate::core::resolution::{BandSet, PixelSemantics, ResolutionModel};
use crate::core::roi::RoiRequest;
use crate::error::{Error, Result};
use crate::io::gdal::GdalRasterReader;
use crate::types::{Resolution, SatelliteKind};

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("B1", "B1 Ultra Blue (coastal/aerosol) [435nm-451nm]"),
    ("B2", "B2 Blue [452nm-512nm]"),
    ("B3", "B3 Green [533nm-590nm]"),
    ("B4", "B4 Red [636nm-673nm]"),
    ("B5", "B5 Near Infrared (NIR) [851nm-879nm]"),
    ("B6", "B6 Shortwave Infrared (SWIR) 1 [1566nm-1651nm]"),
    ("B7", "B7 Shortwave Infrared (SWIR) 2 [2107nm-2294nm]"),
    ("B8", "B8 Panchromatic [503nm-676nm]"),
    ("B9", "B9 Cirrus [1363nm-1384nm]"),
    ("B10", "B10 Thermal Infrared (TIRS) 1 [1060nm-1119nm]"),
    ("B11", "B11 Thermal Infrared (TIRS) 2 [1150nm-1251nm]"),
];

pub fn model() -> Result<ResolutionModel> {
    let model = ResolutionModel::new(
        vec![
            BandSet::new(15, &["B8"]),
            BandSet::new(
                30,
                &["B1", "B2", "B3", "B4", "B5", "B6", "B7", "B9", "B10", "B11"],
            ),
        ],
        PixelSemantics::default(),
    )?;
    Ok(model
        .with_descriptions(DESCRIPTIONS)
        .with_patch_geometry(&[(30, 128, 8)]))
}

/// Flattened `GROUP = ... / END_GROUP` metadata: keys are dotted group paths
/// such as `L1_METADATA_FILE.METADATA_FILE_INFO.LANDSAT_PRODUCT_ID`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MtlDocument {
    entries: BTreeMap<String, String>,
}

impl MtlDocument {
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut groups: Vec<String> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line == "END" {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim().trim_matches('"'));
            match key {
                "GROUP" => groups.push(value.to_string()),
                "END_GROUP" => {
                    groups.pop();
                }
                _ => {
                    let mut path = groups.join(".");
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                    entries.insert(path, value.to_string());
                }
            }
        }
        Self { entries }
    }

    pub fn read(path: &Path) -> Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// First value whose innermost key is `key`, whatever group holds it.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(path, _)| path.rsplit('.').next() == Some(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Landsat8 {
    model: ResolutionModel,
}

impl Landsat8 {
    pub fn new() -> Result<Self> {
        Ok(Self { model: model()? })
    }
}

/// `<scene>/<product id>_<band>.TIF`
pub fn band_file(scene: &Path, product_id: &str, band: &str) -> PathBuf {
    scene.join(format!("{}_{}.TIF", product_id, band))
}

impl SatelliteAdapter for Landsat8 {
    fn kind(&self) -> SatelliteKind {
        SatelliteKind::Landsat8
    }

    fn model(&self) -> &ResolutionModel {
        &self.model
    }

    fn read_bands(&self, tile: &Path, request: &RoiRequest, max_res: Resolution) -> Result<TileRead> {
        let (levels, scales) = active_scales(&self.model, max_res)?;
        let mtl_path = find_in_dir(tile, |name| name.ends_with("MTL.txt"))?
            .ok_or_else(|| Error::config(format!("no MTL metadata file in {:?}", tile)))?;
        let mtl = MtlDocument::read(&mtl_path)?;
        let product_id = mtl
            .find("LANDSAT_PRODUCT_ID")
            .ok_or_else(|| Error::config(format!("{:?} has no LANDSAT_PRODUCT_ID", mtl_path)))?;
        debug!("Landsat product {} ({} metadata entries)", product_id, mtl.len());

        let mut readers: Vec<(Resolution, Vec<GdalRasterReader>)> = Vec::with_capacity(levels.len());
        for res in &levels {
            let bands = self.model.bands(*res)?;
            let mut level = Vec::with_capacity(bands.len());
            for band in bands {
                let path = band_file(tile, product_id, band);
                if !path.exists() {
                    return Err(Error::MissingBand {
                        resolution: *res,
                        expected: bands.to_vec(),
                        found: Vec::new(),
                    });
                }
                level.push(GdalRasterReader::open(&path)?);
            }
            readers.push((*res, level));
        }

        let finest = &readers[0].1[0];
        let georef = finest.metadata.georef();
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

#[cfg(test)]
mod tests {
    use super::*;

    const MTL: &str = r#"GROUP = L1_METADATA_FILE
  GROUP = METADATA_FILE_INFO
    ORIGIN = "Image courtesy of the U.S. Geological Survey"
    LANDSAT_PRODUCT_ID = "LC08_L1TP_202032_20190305_20190309_01_T1"
  END_GROUP = METADATA_FILE_INFO
  GROUP = PRODUCT_METADATA
    REFLECTIVE_LINES = 7801
  END_GROUP = PRODUCT_METADATA
END_GROUP = L1_METADATA_FILE
END
"#;

    #[test]
    fn mtl_groups_become_dotted_paths() {
        let doc = MtlDocument::parse(MTL);
        assert_eq!(doc.len(), 3);
        assert_eq!(
            doc.get("L1_METADATA_FILE.METADATA_FILE_INFO.LANDSAT_PRODUCT_ID"),
            Some("LC08_L1TP_202032_20190305_20190309_01_T1")
        );
        assert_eq!(doc.find("REFLECTIVE_LINES"), Some("7801"));
        assert_eq!(doc.find("MISSING"), None);
    }

    #[test]
    fn band_files_follow_product_id() {
        let path = band_file(Path::new("/scenes/a"), "LC08_X", "B10");
        assert_eq!(path, PathBuf::from("/scenes/a/LC08_X_B10.TIF"));
    }

    #[test]
    fn missing_band_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LC08_X_MTL.txt"), MTL).unwrap();
        let adapter = Landsat8::new().unwrap();
        let err = adapter
            .read_bands(dir.path(), &RoiRequest::Full, Resolution(30))
            .unwrap_err();
        assert!(matches!(err, Error::MissingBand { resolution: Resolution(15), .. }));
    }
}
