use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::processing::sampling::SamplerConfig;
use crate::core::resolution::ResolutionModel;
use crate::core::roi::RoiRequest;
use crate::error::Result;
use crate::satellites::AdapterOptions;
use crate::types::{OutputFormat, Resolution, SatelliteKind};

/// Inference patch size and border for one target level, in finest-level pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOverride {
    pub patch_size: usize,
    pub border: usize,
}

/// Super-resolution parameters suitable for config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    pub satellite: SatelliteKind,
    /// Coarsest level to super-resolve; None means every level of the satellite
    pub max_resolution: Option<Resolution>,
    pub roi: RoiRequest,
    /// Forced UTM zone for tiles holding several (Sentinel-2)
    pub utm_zone: Option<String>,
    pub format: OutputFormat,
    /// Write the original finest bands ahead of the super-resolved ones
    pub copy_original_bands: bool,
    /// Per target level patch geometry replacing the satellite defaults
    pub patches: BTreeMap<Resolution, PatchOverride>,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            satellite: SatelliteKind::Sentinel2,
            max_resolution: None,
            roi: RoiRequest::Full,
            utm_zone: None,
            format: OutputFormat::GTiff,
            copy_original_bands: true,
            patches: BTreeMap::new(),
        }
    }
}

impl InferenceParams {
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            utm_zone: self.utm_zone.clone(),
        }
    }

    /// `max_resolution`, or the coarsest level of `model`.
    pub fn max_resolution_for(&self, model: &ResolutionModel) -> Resolution {
        self.max_resolution.unwrap_or_else(|| model.coarsest())
    }

    /// `model` with the configured patch overrides applied.
    pub fn apply_patch_overrides(&self, model: &ResolutionModel) -> ResolutionModel {
        let geometry: Vec<(u32, usize, usize)> = self
            .patches
            .iter()
            .map(|(res, o)| (res.gsd(), o.patch_size, o.border))
            .collect();
        model.clone().with_patch_geometry(&geometry)
    }
}

/// Training-patch creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchParams {
    pub satellite: SatelliteKind,
    pub max_resolution: Option<Resolution>,
    pub roi: RoiRequest,
    pub utm_zone: Option<String>,
    pub sampler: SamplerConfig,
}

impl Default for PatchParams {
    fn default() -> Self {
        Self {
            satellite: SatelliteKind::Sentinel2,
            max_resolution: None,
            roi: RoiRequest::Full,
            utm_zone: None,
            sampler: SamplerConfig::default(),
        }
    }
}

impl PatchParams {
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            utm_zone: self.utm_zone.clone(),
        }
    }

    pub fn max_resolution_for(&self, model: &ResolutionModel) -> Resolution {
        self.max_resolution.unwrap_or_else(|| model.coarsest())
    }
}

/// Load a parameter struct from a JSON file; missing keys take their defaults.
pub fn load_params<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
