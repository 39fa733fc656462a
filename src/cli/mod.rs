//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Turn a folder of photos into a 3D model file
///
/// Drives an external photogrammetry engine, reports progress and
/// cleans up the engine's scratch directory when the model is written.
#[derive(Parser, Debug)]
#[command(name = "reality-parser")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of the standard locations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log session activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print version information
    #[arg(long)]
    pub version: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconstruct a model from a folder of images
    Process {
        /// Folder containing the input images
        input: PathBuf,

        /// Where the model file is written (replaced if it exists)
        output: PathBuf,

        /// Model detail (reduced, medium, full, raw)
        #[arg(short, long)]
        detail: Option<String>,

        /// Image ordering (unordered, sequential)
        #[arg(short, long)]
        ordering: Option<String>,

        /// Feature sensitivity (normal, high)
        #[arg(short, long)]
        sensitivity: Option<String>,

        /// Path where the caller expects the finished result
        #[arg(long)]
        result: Option<PathBuf>,

        /// Use a simulated engine instead of the external program
        #[arg(long)]
        dry_run: bool,
    },

    /// Check whether the reconstruction engine is available
    Check,

    /// Show the config file location and effective settings
    Config,
}
