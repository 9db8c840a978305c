//! CLI definitions for VFT
//!
//! The clap structures live apart from main.rs so the command handlers in
//! `commands/` can reference argument types without pulling in dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use vft::vital::CellPolicy;

#[derive(Parser)]
#[command(name = "vft")]
#[command(about = "Vital File Tools - parse, resample, and re-encode VITA recordings")]
#[command(
    long_about = "Vital File Tools (VFT) - work with gzip-compressed VITA containers.

A container holds multi-track physiological time series: waveforms, scalar
numerics, and string events, recorded by bedside monitoring devices. VFT
lists the tracks inside a container, re-projects them onto a fixed time
grid for CSV export, and derives new containers by subsetting, clipping,
or deidentifying an existing one.

QUICK START:
    vft tracks case1.vital                 List tracks and time bounds
    vft export case1.vital -i 1            One CSV row per second
    vft copy case1.vital out.vital --tracks BIS/BIS,BIS/SEF
    vft deid case1.vital anon.vital        Relocate timestamps to 2100"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tracks in a container
    Tracks {
        /// Container file
        file: PathBuf,
        /// Emit JSON instead of CSV
        #[arg(long)]
        json: bool,
        /// Fail on records that reference an undefined track
        #[arg(long)]
        strict: bool,
    },

    /// Resample a container onto a fixed time grid and write CSV
    Export {
        /// Container file
        file: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
        #[command(flatten)]
        render: RenderArgs,
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Copy a container, optionally subsetting tracks or clipping time
    Copy {
        /// Input container
        input: PathBuf,
        /// Output container
        output: PathBuf,
        /// Comma-separated DEV/TRK list; `*` wildcards allowed
        #[arg(long, short)]
        tracks: Option<String>,
        /// Keep only the first SECS seconds of data
        #[arg(long, value_name = "SECS")]
        max_length: Option<f64>,
    },

    /// Deidentify a container by moving its timestamps
    Deid {
        /// Input container
        input: PathBuf,
        /// Output container
        output: PathBuf,
        /// Shift timestamps by this many seconds, keeping the timezone bias
        #[arg(long, conflicts_with = "target_epoch")]
        shift: Option<f64>,
        /// Relocate the recording to start at this epoch (default 2100-01-01)
        #[arg(long, value_name = "EPOCH")]
        target_epoch: Option<f64>,
    },

    /// Export every container in a directory to CSV
    Batch {
        /// Directory holding *.vital files
        dir: PathBuf,
        /// Output directory (defaults to the input directory)
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        grid: GridArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
}

/// Grid sizing and cell-selection flags shared by `export` and `batch`.
#[derive(Args, Clone)]
pub struct GridArgs {
    /// Row interval in seconds; accepts N/D fractions like 1/100
    #[arg(long, short)]
    pub interval: Option<String>,
    /// Comma-separated DEV/TRK list; all tracks when omitted
    #[arg(long, short)]
    pub tracks: Option<String>,
    /// How multiple samples in one cell reduce to a value
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<CellPolicy>,
    /// Fail unless every selected track has data
    #[arg(long)]
    pub require_all: bool,
    /// Replace blank cells with the last value of the column
    #[arg(long)]
    pub fill_last: bool,
    /// Omit rows with no data in any column
    #[arg(long)]
    pub skip_blank: bool,
}

/// Output formatting flags shared by `export` and `batch`.
#[derive(Args, Clone)]
pub struct RenderArgs {
    /// Print a header row first
    #[arg(long)]
    pub header: bool,
    /// Print the input file name as the first column
    #[arg(long)]
    pub filename_column: bool,
    /// Prefix column names with their device name
    #[arg(long)]
    pub device_names: bool,
    /// Print wall-clock time using the container's timezone bias
    #[arg(long, conflicts_with = "unix_time")]
    pub absolute_time: bool,
    /// Print raw epoch seconds
    #[arg(long)]
    pub unix_time: bool,
}
