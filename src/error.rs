//! Crate-level error type and `Result` alias for structured error handling.
//! Converts underlying I/O and GDAL errors, and provides the semantic variants
//! used by the engine: configuration, ROI, band lookup, empty regions and
//! per-tile sampling exhaustion.
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Resolution;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid region of interest: {0}")]
    InvalidRoi(String),

    #[error("Missing bands at {resolution}m. Expected: {expected:?}, found: {found:?}")]
    MissingBand {
        resolution: Resolution,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Empty region: {0}")]
    EmptyRegion(String),

    #[error("Sampling exhausted for {tile:?} after {attempts} attempts: the image looks mostly empty")]
    SamplingExhausted { tile: PathBuf, attempts: usize },

    #[error("Predictor error: {0}")]
    Predictor(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Per-tile failures that skip the tile instead of aborting a batch.
    pub fn is_tile_skippable(&self) -> bool {
        matches!(self, Error::SamplingExhausted { .. } | Error::EmptyRegion(_))
    }
}
