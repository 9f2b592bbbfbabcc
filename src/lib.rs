#![doc = r#"
SATSR: multi-resolution tile patching, sampling and reconstruction for
satellite super-resolution.

Multispectral sensors capture their bands at several ground resolutions
(Sentinel-2: 10/20/60m, Landsat-8: 15/30m, VIIRS: 375/750m). This crate cuts
arbitrarily large multi-resolution tiles into aligned, border-padded patches a
fixed-size model can consume, stitches the model's predictions back into a
seamless raster at the finest resolution with no-data pixels preserved, and
samples informative training patches from sparse imagery.

The learned model itself is not part of the crate: anything implementing
[`Predictor`] (including a plain closure) can be plugged in.

Stability
---------
The public library API is experimental in initial releases and may evolve.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: super-resolve a tile to a file
-------------------------------------------
```rust,no_run
use std::path::Path;
use satsr::{
    BilinearBaseline, InferenceParams, OutputFormat, RoiRequest, SatelliteKind,
    inference_profile, super_resolve_tile_to_path,
};

fn main() -> satsr::Result<()> {
    let params = InferenceParams {
        satellite: SatelliteKind::Sentinel2,
        roi: RoiRequest::parse_pixels("0,0,1199,1199")?,
        format: OutputFormat::GTiff,
        ..Default::default()
    };
    let profile = inference_profile(&params)?;
    let written = super_resolve_tile_to_path(
        &profile,
        Path::new("/data/S2A_MSIL1C_example.SAFE"),
        Path::new("/out/example_SR.tif"),
        &params,
        &BilinearBaseline,
    )?;
    println!("wrote {}", written.display());
    Ok(())
}
```

Plugging in a model
-------------------
```rust
use std::collections::BTreeMap;
use ndarray::Array4;
use satsr::{Predictor, Resolution};

struct MyModel;

impl Predictor for MyModel {
    fn predict(
        &self,
        target: Resolution,
        inputs: &BTreeMap<String, Array4<f32>>,
    ) -> satsr::Result<Array4<f32>> {
        // Every input is (N, C, p, p) at the finest patch size; return
        // (N, C_target, p, p).
        inputs
            .get(&target.id())
            .cloned()
            .ok_or_else(|| satsr::Error::Predictor("missing input".into()))
    }
}
```

Training patches
----------------
```rust,no_run
use std::path::{Path, PathBuf};
use satsr::{PatchParams, SampleSequence, create_training_patches, patch_profile};

fn main() -> satsr::Result<()> {
    let params = PatchParams::default();
    let profile = patch_profile(&params)?;
    let tiles = vec![PathBuf::from("/data/tile_a.SAFE"), PathBuf::from("/data/tile_b.SAFE")];
    let report = create_training_patches(&profile, &tiles, Path::new("/patches"), &params, true)?;
    println!("processed={} skipped={} errors={}", report.processed, report.skipped, report.errors);

    let mut sequence = SampleSequence::from_dir(Path::new("/patches"), 32, true, Some(42))?;
    for batch in sequence.iter() {
        let batch = batch?;
        let _ = (batch.inputs, batch.label);
    }
    sequence.end_pass();
    Ok(())
}
```

Error handling
--------------
All public functions return `satsr::Result<T>`; match on `satsr::Error` to
handle specific cases. `SamplingExhausted` and `EmptyRegion` are per-tile
conditions that batch helpers skip rather than abort on.

Useful modules
--------------
- [`api`]: high-level, ergonomic entry points.
- [`core`]: resolution model, rasters, ROI resolution and array processing.
- [`satellites`]: per-satellite band readers and the profile registry.
- [`io`]: GDAL reader, `.npy`/`.npz` codecs, output writers, sample store.
- [`training`]: batched iteration over persisted samples.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod satellites;
pub mod training;
pub mod types;

// Curated public API surface
// Types
pub use core::params::{InferenceParams, PatchOverride, PatchParams, load_params};
pub use core::raster::{GeoReference, Raster};
pub use core::resolution::{BandSet, PixelSemantics, ResolutionModel, ScaleTable};
pub use core::roi::{Roi, RoiRequest};
pub use error::{Error, Result};
pub use types::{OutputFormat, Resolution, SatelliteKind};

// Engine
pub use core::processing::pipeline::{
    BilinearBaseline, OutputBand, Predictor, SuperResolveOptions, super_resolve,
};
pub use core::processing::sampling::{PatchSampler, SamplerConfig, TrainingPair, TrainingSample};
pub use core::processing::tiling::{PatchBatch, PatchGeometry, PatchGrid, extract_patches};
pub use core::processing::recompose::recompose;
pub use core::processing::fill_mask::FillMask;

// Satellites and readers
pub use io::gdal::{GdalError, GdalMetadata, GdalRasterReader};
pub use satellites::{AdapterOptions, SatelliteAdapter, SatelliteProfile, TileRead};

// Training data
pub use io::samples::{SampleRef, SampleStore, TileManifest, discover_samples};
pub use training::{SampleBatch, SampleSequence};

// High-level API re-exports
pub use api::{
    BatchReport, SuperResolvedTile, create_training_patches, inference_profile, iterate_tiles,
    patch_profile, process_directory_to_path, super_resolve_tile, super_resolve_tile_to_path,
};
