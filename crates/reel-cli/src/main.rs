//! reel - inspect, list and convert media files
//!
//! Front end over `reel-io`: every format, sequence and conversion the
//! engine supports is reachable from here.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "reel")]
#[command(author, version, about = "Inspect, list and convert film and video media")]
#[command(long_about = "
Reads Cineon, DPX, OpenEXR, TIFF, PNG, JPEG, Targa, SGI, IFF, PIC, RLA, WAV and (through
ffmpeg) movie files. Numbered files are handled as frame sequences.

Examples:
  reel info scan.0001.dpx               # Header of a sequence
  reel info a.exr b.tif                 # Several files
  reel ls plates/ --long                # Directory with sequences collapsed
  reel convert scan.0001.dpx out.####.exr --type RGB_F16
  reel convert shot.0001.exr proxy.####.jpg --frames 1-24
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// YAML I/O configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display file or sequence information
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// List a directory with sequences collapsed
    Ls(LsArgs),

    /// Convert a file or sequence to another format or pixel type
    #[command(visible_alias = "c")]
    Convert(ConvertArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Input files
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

#[derive(Args)]
struct LsArgs {
    /// Directory to list
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Open every entry and show size, pixel type and frame range
    #[arg(short, long)]
    long: bool,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input file or any frame of a sequence
    input: PathBuf,

    /// Output file; use `####` or a frame number for sequences
    output: PathBuf,

    /// Output pixel type, e.g. RGBA_U16, RGB_F16, L_U8
    #[arg(short = 't', long = "type")]
    pixel_type: Option<String>,

    /// Frames to convert, e.g. 1-10 or 1-5,8
    #[arg(short, long)]
    frames: Option<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = commands::registry(cli.config.as_deref())?;

    // Configure thread pool
    let threads = if cli.threads > 0 {
        cli.threads
    } else {
        registry.config().threads
    };
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Info(args) => commands::info::run(args, &registry, cli.verbose),
        Commands::Ls(args) => commands::ls::run(args, &registry),
        Commands::Convert(args) => commands::convert::run(args, registry, cli.verbose),
    }
}
