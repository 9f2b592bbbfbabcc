use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use satsr::api::{
    BatchReport, create_training_patches, inference_profile, iterate_tiles, patch_profile,
    process_directory_to_path, super_resolve_tile_to_path,
};
use satsr::core::params::{InferenceParams, PatchParams, load_params};
use satsr::core::processing::pipeline::BilinearBaseline;
use satsr::core::roi::RoiRequest;
use satsr::types::Resolution;

use super::args::{CliArgs, Command, InferArgs, PatchArgs, TileArgs};
use super::errors::AppError;

fn init_logging(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }
}

/// ROI from the command line, if one was given.
fn roi_request(args: &TileArgs) -> Result<Option<RoiRequest>, AppError> {
    if let Some(xy) = &args.roi_xy {
        return Ok(Some(RoiRequest::parse_pixels(xy)?));
    }
    if let Some(lonlat) = &args.roi_lonlat {
        return Ok(Some(RoiRequest::parse_lonlat(lonlat)?));
    }
    Ok(None)
}

pub fn inference_params(args: &InferArgs) -> Result<InferenceParams, AppError> {
    let mut params: InferenceParams = match &args.tile.config {
        Some(path) => load_params(path)?,
        None => InferenceParams::default(),
    };
    if let Some(satellite) = args.tile.satellite {
        params.satellite = satellite;
    }
    if let Some(max_res) = args.tile.max_res {
        params.max_resolution = Some(Resolution(max_res));
    }
    if let Some(roi) = roi_request(&args.tile)? {
        params.roi = roi;
    }
    if args.tile.utm_zone.is_some() {
        params.utm_zone = args.tile.utm_zone.clone();
    }
    if let Some(format) = args.format {
        params.format = format;
    }
    if args.no_original_bands {
        params.copy_original_bands = false;
    }
    Ok(params)
}

pub fn patch_params(args: &PatchArgs) -> Result<PatchParams, AppError> {
    let mut params: PatchParams = match &args.tile.config {
        Some(path) => load_params(path)?,
        None => PatchParams::default(),
    };
    if let Some(satellite) = args.tile.satellite {
        params.satellite = satellite;
    }
    if let Some(max_res) = args.tile.max_res {
        params.max_resolution = Some(Resolution(max_res));
    }
    if let Some(roi) = roi_request(&args.tile)? {
        params.roi = roi;
    }
    if args.tile.utm_zone.is_some() {
        params.utm_zone = args.tile.utm_zone.clone();
    }
    if let Some(size) = args.lr_patch_size {
        params.sampler.lr_patch_size = size;
    }
    if args.num_patches.is_some() {
        params.sampler.patches_per_tile = args.num_patches;
    }
    if args.seed.is_some() {
        params.sampler.seed = args.seed;
    }
    Ok(params)
}

/// Log the report; any failed tile makes the command fail.
fn finish_batch(report: &BatchReport) -> Result<(), AppError> {
    info!("Batch processing complete!");
    info!("Processed: {}", report.processed);
    info!("Skipped: {}", report.skipped);
    info!("Errors: {}", report.errors);
    if report.errors > 0 {
        return Err(AppError::BatchFailures {
            errors: report.errors,
        });
    }
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<(), AppError> {
    let params = inference_params(&args)?;
    let profile = inference_profile(&params)?;
    let predictor = BilinearBaseline;

    if let Some(input_dir) = &args.input_dir {
        let output_dir = args.output_dir.as_ref().ok_or(AppError::MissingArgument {
            arg: "--output-dir".to_string(),
        })?;
        info!("Starting batch processing from directory: {:?}", input_dir);
        info!("Output directory: {:?}", output_dir);
        let report = process_directory_to_path(
            &profile,
            input_dir,
            output_dir,
            &params,
            &predictor,
            args.tile.batch,
        )?;
        return finish_batch(&report);
    }

    let input = args.input.as_ref().ok_or(AppError::MissingArgument {
        arg: "--input".to_string(),
    })?;
    let output = args.output.as_ref().ok_or(AppError::MissingArgument {
        arg: "--output".to_string(),
    })?;
    let written = super_resolve_tile_to_path(&profile, input, output, &params, &predictor)?;
    info!("Super-resolved {:?} -> {:?}", input, written);
    Ok(())
}

fn run_patches(args: PatchArgs) -> Result<(), AppError> {
    let params = patch_params(&args)?;
    let profile = patch_profile(&params)?;

    let tiles: Vec<PathBuf> = if !args.tiles.is_empty() {
        args.tiles.clone()
    } else {
        let dir = args.input_dir.as_ref().ok_or(AppError::MissingArgument {
            arg: "--tiles or --input-dir".to_string(),
        })?;
        let tiles: Vec<PathBuf> = iterate_tiles(dir)?.collect();
        if tiles.is_empty() {
            return Err(AppError::NoTiles {
                dir: dir.display().to_string(),
            });
        }
        tiles
    };

    std::fs::create_dir_all(&args.output_dir)?;
    let report = create_training_patches(
        &profile,
        &tiles,
        &args.output_dir,
        &params,
        args.tile.batch,
    )?;
    finish_batch(&report)
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);
    match args.command {
        Command::Infer(infer) => run_infer(infer)?,
        Command::Patches(patches) => run_patches(patches)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_tiles_fail_the_command() {
        let clean = BatchReport {
            processed: 3,
            skipped: 2,
            errors: 0,
        };
        assert!(finish_batch(&clean).is_ok());

        let failed = BatchReport { errors: 1, ..clean };
        match finish_batch(&failed) {
            Err(AppError::BatchFailures { errors }) => assert_eq!(errors, 1),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
