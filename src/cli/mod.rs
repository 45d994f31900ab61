//! CLI Module
//!
//! Command-line interface for the Phoneline degradation engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Phoneline - plays a recording back through a failing phone line
#[derive(Parser, Debug)]
#[command(name = "phoneline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a WAV file and play it through the degradation engine
    #[command(name = "play")]
    Play {
        /// Recording to play
        input: PathBuf,

        /// Write the degraded output to this WAV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the degradation curve
    #[command(name = "curve")]
    Curve {
        /// Number of progress steps between 0 and 1
        #[arg(short, long, default_value_t = 10)]
        steps: usize,
    },

    /// Print the effective configuration as JSON
    #[command(name = "print-config")]
    PrintConfig,
}
