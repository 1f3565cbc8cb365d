use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mseforged")]
#[command(author, version, about = "Fragmented MP4 segment parser and source buffer driver")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse the initialization segment of a file and list its tracks
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Append a file to a source buffer in chunks, as a player would
    Feed {
        /// Fragmented MP4 file to append
        #[arg(required = true)]
        file: PathBuf,

        /// Bytes per append (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Content type of the source buffer (overrides config)
        #[arg(long = "type")]
        content_type: Option<String>,
    },

    /// Write a synthetic fragmented MP4 stream
    Generate {
        /// Output file
        #[arg(required = true)]
        output: PathBuf,

        /// Number of media segments after the init segment
        #[arg(long, default_value = "3")]
        segments: u32,

        /// Add an audio track
        #[arg(long)]
        audio: bool,

        /// Use 64-bit (version 1) time fields
        #[arg(long)]
        version1: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
