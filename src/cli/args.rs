//! Command line argument parsing for the Quiver CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Quiver - build partitioned indexes with a pool of exclusive writers
#[derive(Parser, Debug, Clone)]
#[command(name = "quiver")]
#[command(about = "Build partitioned indexes with a pool of exclusive writers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct QuiverArgs {
    /// More log output; repeat for more (default warn, -v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Errors only; wins over -v
    #[arg(short, long)]
    pub quiet: bool,

    /// How reports are printed
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Indent JSON reports
    #[arg(long)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl QuiverArgs {
    /// 0 when quiet, otherwise 1 plus the number of `-v` flags.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }

    /// Log level for [`verbosity`](Self::verbosity).
    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity() {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index a JSON-lines file into partitioned segments
    Build(BuildArgs),

    /// Show the partitions and segments of an index directory
    Inspect(InspectArgs),
}

/// Arguments for building an index
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Input file with one JSON object per line
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Index output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Job configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "QUIVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of partitions (writers)
    #[arg(short, long)]
    pub partitions: Option<usize>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Field whose value selects the partition
    #[arg(short, long)]
    pub key_field: Option<String>,

    /// Documents per check-out
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Write to memory only, leaving the output directory untouched
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for inspecting an index
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Index directory
    #[arg(value_name = "DIR")]
    pub index_path: PathBuf,

    /// Count documents in every segment
    #[arg(long)]
    pub count_docs: bool,
}

/// Report format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text for terminals
    Human,
    /// One JSON document per report
    Json,
}
