//! Core engine: the resolution model, in-memory rasters, ROI resolution,
//! run parameters and the array processing in `processing`. These are the
//! primitives consumed by the high-level `api` module.
pub mod params;
pub mod processing;
pub mod raster;
pub mod resolution;
pub mod roi;
