use gdal::DriverManager;
use gdal::Metadata;
use gdal::raster::{Buffer, ColorInterpretation};
use std::path::Path;
use tracing::debug;

use crate::core::processing::pipeline::OutputBand;
use crate::core::raster::GeoReference;
use crate::io::gdal::GdalError;
use crate::io::writers::metadata::{RunMetadata, embed_gdal_metadata};

/// Write output bands as Float64 through the GDAL driver `driver_name`,
/// one raster band per output band with its description.
pub fn write_gdal_bands(
    output: &Path,
    driver_name: &str,
    bands: &[OutputBand],
    georef: &GeoReference,
    meta: Option<&RunMetadata>,
) -> Result<(), GdalError> {
    let (rows, cols) = match bands.first() {
        Some(band) => band.data.dim(),
        None => return Err(GdalError::UnsupportedFormat("no bands to write".into())),
    };
    if let Some(bad) = bands.iter().find(|b| b.data.dim() != (rows, cols)) {
        let (r, c) = bad.data.dim();
        return Err(GdalError::DimensionMismatch(cols, rows, c, r));
    }

    let driver = DriverManager::get_driver_by_name(driver_name)?;
    let mut ds = driver.create_with_band_type::<f64, _>(output, cols, rows, bands.len())?;
    embed_gdal_metadata(&mut ds, georef, meta)?;

    for (i, band) in bands.iter().enumerate() {
        let mut handle = ds.rasterband(i + 1)?;
        handle.set_color_interpretation(ColorInterpretation::GrayIndex)?;
        handle.set_description(&band.description)?;
        let values: Vec<f64> = band.data.iter().map(|&v| v as f64).collect();
        let mut buf = Buffer::new((cols, rows), values);
        handle.write((0, 0), (cols, rows), &mut buf)?;
        debug!("Wrote band {} ({}) to {:?}", i + 1, band.description, output);
    }
    Ok(())
}
