use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use satsr::types::{OutputFormat, SatelliteKind};

#[derive(Parser)]
#[command(name = "satsr", version, about = "SATSR CLI")]
pub struct CliArgs {
    /// Enable debug logging (otherwise RUST_LOG is honoured)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Super-resolve tiles to the finest resolution of their satellite
    Infer(InferArgs),
    /// Sample training patches from tiles
    Patches(PatchArgs),
}

/// Options shared by both subcommands
#[derive(Args, Clone)]
pub struct TileArgs {
    /// JSON parameter file; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Satellite family of the tiles
    #[arg(short, long, value_enum)]
    pub satellite: Option<SatelliteKind>,

    /// Coarsest resolution (in the satellite's GSD units) to take part
    #[arg(long)]
    pub max_res: Option<u32>,

    /// Pixel ROI at the finest level: "x1,y1,x2,y2"
    #[arg(long, conflicts_with = "roi_lonlat")]
    pub roi_xy: Option<String>,

    /// WGS84 ROI: "lon1,lat1,lon2,lat2"
    #[arg(long)]
    pub roi_lonlat: Option<String>,

    /// UTM zone to use when a tile holds several (e.g. "UTM 31N")
    #[arg(long)]
    pub utm_zone: Option<String>,

    /// Batch mode: continue with the next tile when one fails
    #[arg(long, default_value_t = false)]
    pub batch: bool,
}

#[derive(Args)]
pub struct InferArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    /// Input tile (single file mode)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory of tiles (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Output file (single file mode)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output directory (batch mode)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output raster format
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Only write the super-resolved bands
    #[arg(long, default_value_t = false)]
    pub no_original_bands: bool,
}

#[derive(Args)]
pub struct PatchArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    /// Tiles to sample
    #[arg(short, long, num_args = 1..)]
    pub tiles: Vec<PathBuf>,

    /// Directory of tiles, used when no explicit tiles are given
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Root directory receiving one sample directory per tile
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Edge of the low-resolution sample crop
    #[arg(long)]
    pub lr_patch_size: Option<usize>,

    /// Samples per tile; derived from the tile area when unset
    #[arg(long)]
    pub num_patches: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,
}
