//! CLI parse: clap types for lessonpool. No behavior; definitions only.

use crate::types::PoolType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lessonpool - keeps lesson pools stocked through batch generation
#[derive(Parser, Debug)]
#[command(name = "lessonpool")]
#[command(about = "Batch generation and pool inventory for quiz lessons")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a generation batch for pools that are running low
    Refill {
        /// Pool to refill (scheduled, on-demand); all pools when omitted
        pool: Option<PoolType>,
    },
    /// Poll batch jobs on the configured interval until Ctrl-C
    Monitor {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Check every active batch job now and print a report
    Check,
    /// Show pool inventory and active batch jobs
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Take the next lesson from a pool and print it as JSON
    Next {
        /// Pool to take from (scheduled, on-demand)
        pool: PoolType,
    },
}
