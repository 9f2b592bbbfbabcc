//! Shared types and enums used across SATSR.
//! Includes `Resolution` (ground sample distance of a band group),
//! `SatelliteKind` and the raster `OutputFormat`.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Ground sample distance of one band group, in the satellite's native unit.
/// Ordered: the smallest value is the finest grid.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resolution(pub u32);

impl Resolution {
    pub fn gsd(self) -> u32 {
        self.0
    }

    /// Identifier used to key predictor inputs and persisted sample files.
    pub fn id(self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Resolution {
    fn from(gsd: u32) -> Self {
        Resolution(gsd)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SatelliteKind {
    Sentinel2,
    Landsat8,
    Viirs,
}

impl std::fmt::Display for SatelliteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SatelliteKind::Sentinel2 => "sentinel2",
            SatelliteKind::Landsat8 => "landsat8",
            SatelliteKind::Viirs => "viirs",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum OutputFormat {
    #[value(name = "gtiff")]
    GTiff,
    Envi,
    Hfa,
    #[value(name = "netcdf")]
    NetCdf,
    /// Raw-array archive, also used as fallback when GDAL cannot create the format
    Npz,
}

impl OutputFormat {
    /// GDAL driver short name, `None` for formats written without GDAL.
    pub fn driver_name(&self) -> Option<&'static str> {
        match self {
            OutputFormat::GTiff => Some("GTiff"),
            OutputFormat::Envi => Some("ENVI"),
            OutputFormat::Hfa => Some("HFA"),
            OutputFormat::NetCdf => Some("netCDF"),
            OutputFormat::Npz => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::GTiff => "tif",
            OutputFormat::Envi => "bin",
            OutputFormat::Hfa => "img",
            OutputFormat::NetCdf => "nc",
            OutputFormat::Npz => "npz",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.driver_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "npz"),
        }
    }
}
