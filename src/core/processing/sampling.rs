//! Rejection sampling of aligned training patches.
//!
//! A tile is turned into a supervised pair by degrading every level by the
//! coarsest scale: the degraded levels are the inputs and the coarsest level
//! at its native resolution is the label. Random small crops are drawn in the
//! degraded coarsest frame and kept only when most of the label is non-zero.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array3, Axis, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::processing::downsample::downsample;
use crate::core::processing::resize::upsample_channels;
use crate::core::raster::Raster;
use crate::core::resolution::ScaleTable;
use crate::error::{Error, Result};
use crate::types::Resolution;

pub const DEFAULT_LR_PATCH_SIZE: usize = 16;
pub const DEFAULT_MIN_VALID_FRACTION: f32 = 0.5;
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;
pub const DEFAULT_PATCHES_PER_AREA: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Crop edge in the degraded coarsest frame
    pub lr_patch_size: usize,
    /// A crop is kept when strictly more than this share of label values is non-zero
    pub min_valid_fraction: f32,
    /// Draws per sample before the tile is given up
    pub max_attempts: usize,
    /// Explicit sample count; `None` derives it from the label area
    pub patches_per_tile: Option<usize>,
    /// Samples per `lr_patch_size²` label pixels when the count is derived
    pub patches_per_area: usize,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            lr_patch_size: DEFAULT_LR_PATCH_SIZE,
            min_valid_fraction: DEFAULT_MIN_VALID_FRACTION,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            patches_per_tile: None,
            patches_per_area: DEFAULT_PATCHES_PER_AREA,
            seed: None,
        }
    }
}

/// One accepted sample, channel-first.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    /// `(C, L, L)` per level, every level upsampled to the label shape
    pub inputs: BTreeMap<Resolution, Array3<f32>>,
    /// `(C, L, L)` crop of the label level
    pub label: Array3<f32>,
    pub label_resolution: Resolution,
}

/// Destination for accepted samples.
pub trait SampleSink {
    fn persist(&mut self, index: usize, sample: &TrainingSample) -> Result<()>;
}

impl SampleSink for Vec<TrainingSample> {
    fn persist(&mut self, _index: usize, sample: &TrainingSample) -> Result<()> {
        self.push(sample.clone());
        Ok(())
    }
}

/// Degraded inputs and native label of one tile, normalised.
#[derive(Debug, Clone)]
pub struct TrainingPair {
    scales: ScaleTable,
    /// `(h, w, C)` per level, every level degraded by the coarsest scale
    pub inputs: BTreeMap<Resolution, Array3<f32>>,
    /// Coarsest level at native resolution, `(h, w, C)`
    pub label: Array3<f32>,
}

impl TrainingPair {
    /// Crop `raster` to a multiple of the coarsest scale, degrade every level
    /// and divide all values by `norm`.
    pub fn build(raster: &Raster, norm: f32) -> Result<Self> {
        let scales = raster.scales();
        let factor = scales.max_scale();
        let raster = raster.cropped_to_coarsest_multiple(factor)?;

        let mut inputs = BTreeMap::new();
        for (res, data) in raster.levels() {
            let mut lr = downsample(data.view(), factor);
            lr.mapv_inplace(|v| v / norm);
            debug!("Training input {}m: {:?} -> {:?}", res, data.dim(), lr.dim());
            inputs.insert(*res, lr);
        }
        let label = raster
            .level(scales.coarsest())
            .map(|l| l.mapv(|v| v / norm))
            .ok_or_else(|| Error::Processing("raster lost its coarsest level".into()))?;

        Ok(Self {
            scales,
            inputs,
            label,
        })
    }

    pub fn scales(&self) -> &ScaleTable {
        &self.scales
    }

    pub fn label_resolution(&self) -> Resolution {
        self.scales.coarsest()
    }

    /// `(height, width)` of the degraded coarsest level, the frame origins are drawn in.
    pub fn lr_size(&self) -> (usize, usize) {
        let (h, w) = (self.label.len_of(Axis(0)), self.label.len_of(Axis(1)));
        let m = self.scales.max_scale();
        (h / m, w / m)
    }

    pub fn label_pixels(&self) -> usize {
        self.label.len_of(Axis(0)) * self.label.len_of(Axis(1))
    }
}

pub struct PatchSampler<R: Rng = StdRng> {
    config: SamplerConfig,
    rng: R,
}

impl PatchSampler<StdRng> {
    /// Sampler seeded from `config.seed`, or from OS entropy when unset.
    pub fn from_config(config: SamplerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }
}

impl<R: Rng> PatchSampler<R> {
    pub fn new(config: SamplerConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Number of samples to draw from `pair`.
    pub fn sample_count(&self, pair: &TrainingPair) -> usize {
        self.config.patches_per_tile.unwrap_or_else(|| {
            let cell = self.config.lr_patch_size * self.config.lr_patch_size;
            (self.config.patches_per_area * pair.label_pixels() / cell).max(1)
        })
    }

    /// Draw one accepted sample. Fails with `SamplingExhausted` after
    /// `max_attempts` rejected crops.
    pub fn draw(&mut self, pair: &TrainingPair, tile: &Path) -> Result<TrainingSample> {
        let lr = self.config.lr_patch_size;
        let (lr_h, lr_w) = pair.lr_size();
        if lr == 0 || lr_h < lr || lr_w < lr {
            return Err(Error::EmptyRegion(format!(
                "{}: degraded tile {}x{} is smaller than the {}x{} sample crop",
                tile.display(),
                lr_h,
                lr_w,
                lr,
                lr
            )));
        }
        let scales = pair.scales();
        let m = scales.max_scale();
        let label_edge = lr * m;

        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            attempts += 1;
            let r = self.rng.gen_range(0..=lr_h - lr);
            let c = self.rng.gen_range(0..=lr_w - lr);

            let label = pair
                .label
                .slice(s![r * m..r * m + label_edge, c * m..c * m + label_edge, ..]);
            let valid = label.iter().filter(|&&v| v != 0.0).count();
            if valid as f32 <= self.config.min_valid_fraction * label.len() as f32 {
                continue;
            }

            let mut inputs = BTreeMap::new();
            for (res, data) in &pair.inputs {
                let inv = scales.inv_scale(*res);
                let edge = lr * inv;
                let crop = data
                    .slice(s![r * inv..r * inv + edge, c * inv..c * inv + edge, ..])
                    .permuted_axes([2, 0, 1]);
                inputs.insert(*res, upsample_channels(crop, label_edge, label_edge)?);
            }
            debug!("Accepted crop at ({}, {}) after {} attempts", r, c, attempts);
            return Ok(TrainingSample {
                inputs,
                label: label
                    .permuted_axes([2, 0, 1])
                    .as_standard_layout()
                    .to_owned(),
                label_resolution: pair.label_resolution(),
            });
        }

        Err(Error::SamplingExhausted {
            tile: tile.to_path_buf(),
            attempts,
        })
    }

    /// Draw and persist every sample of one tile. On failure nothing is
    /// rolled back; the caller discards the tile's output.
    pub fn sample_tile<S: SampleSink>(
        &mut self,
        pair: &TrainingPair,
        tile: &Path,
        sink: &mut S,
    ) -> Result<usize> {
        let count = self.sample_count(pair);
        info!(
            "Sampling {} patches from {} ({}x{} label at {}m)",
            count,
            tile.display(),
            pair.label.len_of(Axis(0)),
            pair.label.len_of(Axis(1)),
            pair.label_resolution()
        );
        for index in 0..count {
            let sample = self.draw(pair, tile)?;
            sink.persist(index, &sample)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;
    use std::path::PathBuf;

    fn raster(fine: Array3<f32>, coarse: Array3<f32>) -> Raster {
        let mut levels = BTreeMap::new();
        levels.insert(Resolution(10), fine);
        levels.insert(Resolution(20), coarse);
        Raster::new(levels, GeoReference::default()).unwrap()
    }

    fn seeded(config: SamplerConfig) -> PatchSampler {
        PatchSampler::new(config, StdRng::seed_from_u64(7))
    }

    fn small_config() -> SamplerConfig {
        SamplerConfig {
            lr_patch_size: 4,
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn pair_shapes() {
        let r = raster(
            Array3::from_elem((34, 30, 2), 10.0),
            Array3::from_elem((17, 15, 1), 20.0),
        );
        let pair = TrainingPair::build(&r, 2.0).unwrap();
        // cropped to 16x14 at 20m, degraded by 2
        assert_eq!(pair.label.dim(), (16, 14, 1));
        assert_eq!(pair.inputs[&Resolution(20)].dim(), (8, 7, 1));
        assert_eq!(pair.inputs[&Resolution(10)].dim(), (16, 14, 2));
        assert_eq!(pair.lr_size(), (8, 7));
        assert_eq!(pair.label_pixels(), 16 * 14);
        assert!((pair.label[[0, 0, 0]] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn accepted_samples_are_aligned_and_valid() {
        let r = raster(
            Array3::from_elem((40, 40, 2), 300.0),
            Array3::from_elem((20, 20, 1), 500.0),
        );
        let pair = TrainingPair::build(&r, 1.0).unwrap();
        let mut sampler = seeded(SamplerConfig {
            patches_per_tile: Some(3),
            ..small_config()
        });
        let mut sink: Vec<TrainingSample> = Vec::new();
        let n = sampler
            .sample_tile(&pair, Path::new("tile"), &mut sink)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(sink.len(), 3);
        for sample in &sink {
            assert_eq!(sample.label.dim(), (1, 8, 8));
            assert_eq!(sample.label_resolution, Resolution(20));
            assert_eq!(sample.inputs[&Resolution(10)].dim(), (2, 8, 8));
            assert_eq!(sample.inputs[&Resolution(20)].dim(), (1, 8, 8));
        }
    }

    #[test]
    fn empty_label_exhausts_after_exact_attempts() {
        let r = raster(Array3::zeros((40, 40, 1)), Array3::zeros((20, 20, 1)));
        let pair = TrainingPair::build(&r, 2000.0).unwrap();
        let mut sampler = seeded(small_config());
        let mut sink: Vec<TrainingSample> = Vec::new();
        let err = sampler
            .sample_tile(&pair, Path::new("S2_EMPTY"), &mut sink)
            .unwrap_err();
        match err {
            Error::SamplingExhausted { tile, attempts } => {
                assert_eq!(attempts, 100);
                assert_eq!(tile, PathBuf::from("S2_EMPTY"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn half_valid_label_is_rejected() {
        // Every other column is zero, so each crop is exactly 50% valid
        let coarse = Array3::from_shape_fn((8, 8, 1), |(_, c, _)| if c % 2 == 0 { 0.0 } else { 1.0 });
        let r = raster(Array3::from_elem((16, 16, 1), 1.0), coarse);
        let pair = TrainingPair::build(&r, 1.0).unwrap();
        let mut sampler = seeded(SamplerConfig {
            lr_patch_size: 2,
            max_attempts: 10,
            ..SamplerConfig::default()
        });
        let err = sampler.draw(&pair, Path::new("t")).unwrap_err();
        assert!(err.is_tile_skippable());
    }

    #[test]
    fn derived_sample_count() {
        let r = raster(
            Array3::from_elem((64, 64, 1), 1.0),
            Array3::from_elem((32, 32, 1), 1.0),
        );
        let pair = TrainingPair::build(&r, 1.0).unwrap();
        let sampler = seeded(SamplerConfig::default());
        // 5 * 32 * 32 / 16^2
        assert_eq!(sampler.sample_count(&pair), 20);
    }

    #[test]
    fn tile_smaller_than_crop_is_empty_region() {
        let r = raster(
            Array3::from_elem((8, 8, 1), 1.0),
            Array3::from_elem((4, 4, 1), 1.0),
        );
        let pair = TrainingPair::build(&r, 1.0).unwrap();
        let mut sampler = seeded(SamplerConfig::default());
        assert!(matches!(
            sampler.draw(&pair, Path::new("t")),
            Err(Error::EmptyRegion(_))
        ));
    }
}
