use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::processing::pipeline::OutputBand;
use crate::core::raster::GeoReference;
use crate::error::Result;
use crate::io::gdal::driver_can_create;
use crate::io::writers::{RunMetadata, write_gdal_bands, write_metadata_sidecar, write_npz_bands};
use crate::types::OutputFormat;

/// Final path and format for an output request.
///
/// ENVI outputs are addressed by their `.bin` data file, not the `.hdr`.
/// Formats whose GDAL driver cannot create files fall back to `.npz`.
pub fn resolve_output(
    output: &Path,
    format: OutputFormat,
    can_create: impl Fn(&str) -> bool,
) -> (PathBuf, OutputFormat) {
    let mut path = output.to_path_buf();
    let is_hdr = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("hdr"));
    if format == OutputFormat::Envi && is_hdr {
        path.set_extension("bin");
    }
    match format.driver_name() {
        Some(driver) if !can_create(driver) => {
            warn!(
                "GDAL cannot create {} files, writing to npz as a fallback",
                driver
            );
            path.set_extension(OutputFormat::Npz.extension());
            (path, OutputFormat::Npz)
        }
        _ => (path, format),
    }
}

/// Write super-resolved output bands and return the path actually written.
pub fn save_output_bands(
    bands: &[OutputBand],
    output: &Path,
    format: OutputFormat,
    georef: &GeoReference,
    meta: Option<&RunMetadata>,
) -> Result<PathBuf> {
    let (path, format) = resolve_output(output, format, driver_can_create);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match format.driver_name() {
        Some(driver) => write_gdal_bands(&path, driver, bands, georef, meta)?,
        None => {
            write_npz_bands(&path, bands)?;
            if let Some(meta) = meta {
                write_metadata_sidecar(&path, meta, georef)?;
            }
        }
    }
    info!("Saved {} bands as {} to {:?}", bands.len(), format, path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envi_header_name_points_to_data_file() {
        let (path, format) = resolve_output(Path::new("/out/sr.HDR"), OutputFormat::Envi, |_| true);
        assert_eq!(path, PathBuf::from("/out/sr.bin"));
        assert_eq!(format, OutputFormat::Envi);
    }

    #[test]
    fn unsupported_driver_falls_back_to_npz() {
        let (path, format) =
            resolve_output(Path::new("/out/sr.nc"), OutputFormat::NetCdf, |d| d != "netCDF");
        assert_eq!(path, PathBuf::from("/out/sr.npz"));
        assert_eq!(format, OutputFormat::Npz);
    }

    #[test]
    fn npz_output_writes_archive_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let bands = vec![OutputBand {
            name: "SRB5".into(),
            description: "SRB5".into(),
            data: ndarray::Array2::from_elem((3, 3), 4.0),
        }];
        let meta = RunMetadata::new(
            crate::types::SatelliteKind::Landsat8,
            Path::new("LC08"),
            crate::types::Resolution(30),
            crate::core::roi::Roi {
                xmin: 0,
                ymin: 0,
                xmax: 2,
                ymax: 2,
            },
            vec![("SRB5".into(), "SRB5".into())],
        );
        let out = dir.path().join("nested").join("sr.npz");
        let written = save_output_bands(
            &bands,
            &out,
            OutputFormat::Npz,
            &GeoReference::default(),
            Some(&meta),
        )
        .unwrap();
        assert_eq!(written, out);
        assert!(out.exists());
        assert!(dir.path().join("nested").join("sr.json").exists());
    }
}
