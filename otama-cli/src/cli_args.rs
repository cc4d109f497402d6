//! Command-line argument definitions for the `otama` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use otama_core::OutputPolicy;

/// Turn a monophonic instrument into a note or position controller
#[derive(Parser)]
#[command(name = "otama")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Capture from the default input device and print control values
    Run {
        #[command(flatten)]
        settings: Settings,

        /// Log every tick (debug level)
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Overrides layered on top of the config file.
#[derive(Args)]
pub(crate) struct Settings {
    /// JSON config file; missing fields take their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Skip calibration and use the configured default bounds
    #[arg(long)]
    pub no_calibration: bool,

    /// Calibrate top and bottom only
    #[arg(long)]
    pub no_middle: bool,

    /// Input sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum PolicyArg {
    Note,
    Position,
}

impl From<PolicyArg> for OutputPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Note => OutputPolicy::Note,
            PolicyArg::Position => OutputPolicy::Position,
        }
    }
}
