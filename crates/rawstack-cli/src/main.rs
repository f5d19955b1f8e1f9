//! rawstack - decode raw scientific images and stacks
//!
//! Describes the bytes on the command line (or in a YAML sidecar), decodes
//! them and prints frames, completeness and calibration.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rawstack")]
#[command(author, version, about = "Decode raw scientific images and stacks")]
#[command(long_about = "
Decodes uncompressed or simply compressed pixel data whose layout is known
from an external header parser or from the command line.

Examples:
  rawstack info scan.raw -W 512 -H 512 -t gray16-unsigned --little-endian
  rawstack info stack.raw.gz -W 256 -H 256 -t float -n 40 --stats
  rawstack info -d stack.yaml --frames
  rawstack info http://example.org/data/ blobs.raw -W 256 -H 254 -t gray8
  rawstack validate scan.raw -W 2048 -H 2048 -t gray16 -o 4096
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and display image or stack information
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Check a descriptor against the file it points at
    #[command(visible_alias = "v")]
    Validate(ValidateArgs),
}

/// Where the bytes are and how they are laid out.
#[derive(Args, Clone, Debug, Default)]
struct DescriptorArgs {
    /// Input file, or base URL when a name follows
    input: Option<String>,

    /// File name appended to a base URL
    name: Option<String>,

    /// YAML descriptor sidecar (command-line flags override its fields)
    #[arg(short = 'd', long)]
    descriptor: Option<PathBuf>,

    /// Width in pixels
    #[arg(short = 'W', long)]
    width: Option<u32>,

    /// Height in pixels
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Pixel encoding: gray8, gray16-signed, gray16-unsigned, gray12, float,
    /// double, rgb, bgr, argb, abgr, barg, rgb-planar, cmyk, rgb48, ...
    #[arg(short = 't', long = "type")]
    encoding: Option<String>,

    /// Numeric file-type code instead of --type
    #[arg(long, conflicts_with = "encoding")]
    type_code: Option<i32>,

    /// Samples are little-endian
    #[arg(long)]
    little_endian: bool,

    /// Offset of the first pixel byte
    #[arg(short = 'o', long)]
    offset: Option<i64>,

    /// Number of frames
    #[arg(short = 'n', long)]
    images: Option<u32>,

    /// Bytes between frames; "auto" spreads spare file bytes evenly
    #[arg(short = 'g', long)]
    gap: Option<String>,

    /// Content compression: none, lzw, lzw-prediction, packbits, deflate, ...
    #[arg(short = 'c', long)]
    compression: Option<String>,

    /// Samples per pixel (4 for 48-bit RGB with a gray channel)
    #[arg(long)]
    samples: Option<u16>,

    /// HTTP proxy host[:port]
    #[arg(long)]
    proxy: Option<String>,
}

#[derive(Args)]
struct InfoArgs {
    #[command(flatten)]
    source: DescriptorArgs,

    /// Show per-frame labels and ranges
    #[arg(short, long)]
    frames: bool,

    /// Show sample statistics
    #[arg(short, long)]
    stats: bool,

    /// Show all calibration fields
    #[arg(short, long)]
    all: bool,

    /// Do not report progress
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Args)]
struct ValidateArgs {
    #[command(flatten)]
    source: DescriptorArgs,

    /// Header offsets below this skip the length check
    #[arg(long, default_value_t = rawstack_io::DEFAULT_VALIDATION_THRESHOLD)]
    threshold: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info(args) => commands::info::run(args, cli.verbose),
        Commands::Validate(args) => commands::validate::run(args, cli.verbose),
    }
}
