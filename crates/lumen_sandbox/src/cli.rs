use clap::Parser;
use std::path::PathBuf;

/// User-specified command line parameters
#[derive(Debug, Parser)]
#[clap(name = "Lumen Sandbox", about)]
pub struct Args {
    #[clap(long, short = 'd', default_value = "crates/lumen_sandbox/data")]
    /// Directory with entity configuration documents.
    pub data: PathBuf,

    #[clap(long, short = 'm', default_value = "crate.toml")]
    /// Configuration document of the spawned entities, relative to the data directory.
    pub media: String,

    #[clap(long, short = 'g', default_value_t = 3)]
    /// Spawns a grid of `grid * grid` entities.
    pub grid: u32,

    #[clap(long, short = 't', default_value_t = 60)]
    /// Number of ticks to run.
    pub ticks: u32,

    #[clap(long, default_value_t = 1.0)]
    /// Extrapolation factor passed to every tick.
    pub extrp: f64,

    #[clap(long, short = 's')]
    /// Saves the world into this file, then loads it back and compares the result.
    pub save: Option<PathBuf>,

    #[clap(long, short = 'v')]
    /// Enables trace logging.
    pub verbose: bool,
}
