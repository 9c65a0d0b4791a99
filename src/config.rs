//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the linker using `clap`.
//! It handles parsing arguments like input files and the output file path.

use clap::Parser;
use std::path::PathBuf;

/// A linker for Atom object files targeting ARM.
///
/// Merges the given object files, keeps only what the main procedure can
/// reach, and writes a flat binary image.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input object files
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output file
    #[arg(short, long, help = "Path to the output image")]
    pub output: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,

    /// Print the address of every placed atom
    #[arg(long)]
    pub print_map: bool,
}
