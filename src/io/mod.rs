//! I/O layer: GDAL-backed raster reading, `.npy`/`.npz` codecs, output
//! writers and the on-disk training-sample store.
pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalRasterReader, SubDataset};

pub mod npy;
pub mod samples;
pub mod writers;
