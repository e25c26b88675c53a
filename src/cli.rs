//! CLI argument parsing for lockgraph

use crate::config::{Charset, LockgraphConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lockgraph")]
#[command(version)]
#[command(about = "Replay recorded monitor-contention traces and report who waited on whom", long_about = None)]
pub struct Cli {
    /// Trace buffers to decode, in delivery order
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Load settings from a TOML file (flags override it)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Timestamped events carry a CPU-time stamp after the wall-clock one
    #[arg(long = "two-timestamps")]
    pub two_timestamps: bool,

    /// Encoding of thread and class names
    #[arg(long = "charset", value_enum, value_name = "CHARSET")]
    pub charset: Option<Charset>,

    /// How many peer hops to expand below each detail node
    #[arg(long = "max-depth", value_name = "N")]
    pub max_depth: Option<usize>,

    /// Only report the per-thread view
    #[arg(long = "threads-only")]
    pub threads_only: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply command-line overrides on top of `config`
    pub fn apply(&self, mut config: LockgraphConfig) -> LockgraphConfig {
        if self.two_timestamps {
            config.decoder.two_timestamps = true;
        }
        if let Some(charset) = self.charset {
            config.decoder.charset = charset;
        }
        if let Some(depth) = self.max_depth {
            config.tree.max_chain_depth = depth;
        }
        config
    }
}
