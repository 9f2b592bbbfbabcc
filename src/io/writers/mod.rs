//! Output writers: GDAL rasters, `.npz` archives and provenance metadata.
pub mod metadata;
pub mod npz;
pub mod raster;

pub use metadata::{RunMetadata, embed_gdal_metadata, write_metadata_sidecar};
pub use npz::write_npz_bands;
pub use raster::write_gdal_bands;
