//! Command line definition.
//!
//! Lives in the library so `xtask` can render the man page from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::{CompressConfig, ReportFormat, SplitConfig};
use crate::trace::SpoolKind;

/// Split memory-write traces by allocation block and compress the results.
#[derive(Debug, Parser)]
#[command(name = "memlog", version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Split a trace into one artifact per allocation block
    Split(SplitCommand),

    /// Run the analyzer over every compressible artifact
    Compress(CompressCommand),

    /// Summarize analyzer results for an artifact directory
    Report(ReportCommand),

    /// Split a trace, compress the artifacts and print the report
    Run(RunCommand),

    /// Show or create the config file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration if no file exists
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags shared by commands that split a trace.
#[derive(Debug, Clone, Default, Args)]
pub struct SplitArgs {
    /// Keep pending writes on disk or in memory
    #[arg(long, value_enum)]
    pub spool: Option<SpoolKind>,

    /// Ignore blocks smaller than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub min_block_size: Option<u64>,
}

impl SplitArgs {
    pub fn apply(&self, config: &mut SplitConfig) {
        if let Some(spool) = self.spool {
            config.spool = spool;
        }
        if let Some(min) = self.min_block_size {
            config.min_block_size = min;
        }
    }
}

/// Flags shared by commands that run the analyzer.
#[derive(Debug, Clone, Default, Args)]
pub struct AnalyzerArgs {
    /// Analyzer program
    #[arg(long, value_name = "PROGRAM")]
    pub analyzer: Option<String>,

    /// Argument passed to the analyzer before the artifact path (repeatable)
    #[arg(long = "analyzer-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub analyzer_args: Vec<String>,

    /// Worker threads (0 = all cores but one)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Total attempts per artifact
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry, in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_backoff_ms: Option<u64>,

    /// Kill an analyzer run after this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit with status 3 if any artifact exhausted its retries
    #[arg(long)]
    pub fail_on_critical: bool,
}

impl AnalyzerArgs {
    pub fn apply(&self, config: &mut CompressConfig) {
        if let Some(analyzer) = &self.analyzer {
            config.analyzer = analyzer.clone();
        }
        if !self.analyzer_args.is_empty() {
            config.analyzer_args = self.analyzer_args.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max) = self.max_attempts {
            config.max_attempts = max;
        }
        if let Some(ms) = self.retry_backoff_ms {
            config.retry_backoff_ms = ms;
        }
        if let Some(secs) = self.timeout {
            config.task_timeout_secs = secs;
        }
    }
}

#[derive(Debug, Args)]
pub struct SplitCommand {
    /// Trace file
    pub trace: PathBuf,

    /// Artifact directory [default: <TRACE>.parsed]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub split: SplitArgs,
}

#[derive(Debug, Args)]
pub struct CompressCommand {
    /// Directory of artifacts produced by `split`
    pub artifacts: PathBuf,

    /// Analyzer output directory [default: <ARTIFACTS>.results]
    #[arg(short, long, value_name = "DIR")]
    pub results: Option<PathBuf>,

    #[command(flatten)]
    pub analyzer: AnalyzerArgs,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Directory of artifacts produced by `split`
    pub artifacts: PathBuf,

    /// Analyzer output directory [default: <ARTIFACTS>.results]
    #[arg(short, long, value_name = "DIR")]
    pub results: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Trace file
    pub trace: PathBuf,

    /// Artifact directory [default: <TRACE>.parsed]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Analyzer output directory [default: <OUTPUT>.results]
    #[arg(short, long, value_name = "DIR")]
    pub results: Option<PathBuf>,

    #[command(flatten)]
    pub split: SplitArgs,

    #[command(flatten)]
    pub analyzer: AnalyzerArgs,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,
}
