//! High-level, ergonomic library API: super-resolve tiles to files or to
//! in-memory bands, batch helpers for directories, and training-patch
//! creation. Prefer these entrypoints over the low-level processing modules
//! when integrating SATSR.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::params::{InferenceParams, PatchParams};
use crate::core::processing::pipeline::{OutputBand, Predictor, SuperResolveOptions, super_resolve};
use crate::core::processing::sampling::{PatchSampler, TrainingPair};
use crate::core::processing::save::save_output_bands;
use crate::core::raster::GeoReference;
use crate::core::roi::Roi;
use crate::error::{Error, Result};
use crate::io::samples::{SampleStore, TileManifest};
use crate::io::writers::RunMetadata;
use crate::satellites::SatelliteProfile;
use crate::types::Resolution;

/// Result of in-memory super-resolution of one tile
#[derive(Debug, Clone)]
pub struct SuperResolvedTile {
    pub bands: Vec<OutputBand>,
    /// Georeference of the ROI's upper-left pixel at the finest level
    pub georef: GeoReference,
    pub roi: Roi,
    pub max_resolution: Resolution,
}

impl SuperResolvedTile {
    /// Output size `(height, width)`.
    pub fn size(&self) -> (usize, usize) {
        self.bands.first().map(|b| b.data.dim()).unwrap_or((0, 0))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Profile of the satellite named in `params`.
pub fn inference_profile(params: &InferenceParams) -> Result<SatelliteProfile> {
    SatelliteProfile::new(params.satellite, &params.adapter_options())
}

pub fn patch_profile(params: &PatchParams) -> Result<SatelliteProfile> {
    SatelliteProfile::new(params.satellite, &params.adapter_options())
}

/// Read one tile and super-resolve it (no disk output)
pub fn super_resolve_tile<P: Predictor + ?Sized>(
    profile: &SatelliteProfile,
    tile: &Path,
    params: &InferenceParams,
    predictor: &P,
) -> Result<SuperResolvedTile> {
    let model = params.apply_patch_overrides(profile.model());
    let max_resolution = params.max_resolution_for(&model);
    info!(
        "Super resolving {} tile {:?} up to {}m",
        profile.kind(),
        tile,
        max_resolution
    );
    let read = profile.read_bands(tile, &params.roi, max_resolution)?;
    let bands = super_resolve(
        &read.raster,
        &model,
        max_resolution,
        predictor,
        SuperResolveOptions {
            copy_original_bands: params.copy_original_bands,
        },
    )?;
    Ok(SuperResolvedTile {
        bands,
        georef: read.raster.georef().clone(),
        roi: read.roi,
        max_resolution,
    })
}

/// Super-resolve one tile and write it to `output`; returns the path written,
/// which differs from `output` when the format forces another extension.
pub fn super_resolve_tile_to_path<P: Predictor + ?Sized>(
    profile: &SatelliteProfile,
    tile: &Path,
    output: &Path,
    params: &InferenceParams,
    predictor: &P,
) -> Result<PathBuf> {
    let result = super_resolve_tile(profile, tile, params, predictor)?;
    let meta = RunMetadata::new(
        profile.kind(),
        tile,
        result.max_resolution,
        result.roi,
        result
            .bands
            .iter()
            .map(|b| (b.name.clone(), b.description.clone()))
            .collect(),
    );
    save_output_bands(&result.bands, output, params.format, &result.georef, Some(&meta))
}

/// Return the entries of `input_dir` that may hold a tile (sub-directories and
/// files), in name order
pub fn iterate_tiles(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut tiles = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if !hidden {
            tiles.push(path);
        }
    }
    tiles.sort();
    Ok(tiles.into_iter())
}

fn tile_name(tile: &Path) -> Result<String> {
    tile.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::config(format!("cannot derive a tile name from {:?}", tile)))
}

/// Super-resolve every tile of `input_dir` into `output_dir` using `params`.
/// If `continue_on_error` is true, errors are counted in the report and
/// processing continues; otherwise, the first error is returned.
pub fn process_directory_to_path<P: Predictor + ?Sized>(
    profile: &SatelliteProfile,
    input_dir: &Path,
    output_dir: &Path,
    params: &InferenceParams,
    predictor: &P,
    continue_on_error: bool,
) -> Result<BatchReport> {
    std::fs::create_dir_all(output_dir)?;
    let mut report = BatchReport::default();

    for tile in iterate_tiles(input_dir)? {
        let outcome = tile_name(&tile).and_then(|name| {
            let output = output_dir.join(format!("{}_SR.{}", name, params.format.extension()));
            super_resolve_tile_to_path(profile, &tile, &output, params, predictor)
        });
        match outcome {
            Ok(_) => report.processed += 1,
            Err(e) if e.is_tile_skippable() => {
                warn!("Skipping {:?}: {}", tile, e);
                report.skipped += 1;
            }
            Err(e) => {
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
                warn!("Failed on {:?}: {}", tile, e);
            }
        }
    }
    Ok(report)
}

/// Sample training patches from `tiles` into `output_root/<tile name>/`.
///
/// Each tile directory is cleared first. Tiles that are too empty to sample
/// are discarded and counted as skipped; other failures count as errors and
/// abort the batch unless `continue_on_error` is set.
pub fn create_training_patches(
    profile: &SatelliteProfile,
    tiles: &[PathBuf],
    output_root: &Path,
    params: &PatchParams,
    continue_on_error: bool,
) -> Result<BatchReport> {
    let model = profile.model();
    let max_resolution = params.max_resolution_for(model);
    let levels = model.active_levels(max_resolution)?;
    let norm = model.pixels().norm;
    let mut sampler = PatchSampler::from_config(params.sampler.clone());
    let mut report = BatchReport::default();

    // Sample one tile into its own directory; the directory is removed on failure
    let mut sample_one = |tile: &Path| -> Result<()> {
        let name = tile_name(tile)?;
        let mut store = SampleStore::create(output_root, &name)?;
        let outcome = profile
            .read_bands(tile, &params.roi, max_resolution)
            .and_then(|read| TrainingPair::build(&read.raster, norm))
            .and_then(|pair| {
                let samples = sampler.sample_tile(&pair, tile, &mut store)?;
                Ok((pair.label_resolution(), samples))
            });
        match outcome {
            Ok((label_resolution, samples)) => {
                store.finish(&TileManifest {
                    tile: name,
                    satellite: profile.kind(),
                    levels: levels.clone(),
                    label_resolution,
                    samples,
                    lr_patch_size: params.sampler.lr_patch_size,
                    created: chrono::Utc::now().to_rfc3339(),
                })?;
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = store.discard() {
                    warn!("Could not remove partial samples of {:?}: {}", tile, cleanup);
                }
                Err(e)
            }
        }
    };

    for (i, tile) in tiles.iter().enumerate() {
        info!("Tile {}/{}: {:?}", i + 1, tiles.len(), tile);
        match sample_one(tile.as_path()) {
            Ok(()) => report.processed += 1,
            Err(e) if e.is_tile_skippable() => {
                warn!("Skipping {:?}: {}", tile, e);
                report.skipped += 1;
            }
            Err(e) => {
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
                warn!("Failed on {:?}: {}", tile, e);
            }
        }
    }

    info!(
        "Patch creation done: processed={} skipped={} errors={}",
        report.processed, report.skipped, report.errors
    );
    Ok(report)
}
