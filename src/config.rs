//! User configuration.
//!
//! Read from `$MEMLOG_CONFIG` if set, else `<config_dir>/memlog/config.toml`.
//! Every field has a default, so a missing file or a partial one is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compress::{default_workers, ExternalAnalyzer, OrchestratorConfig};
use crate::trace::{ClassifierOptions, SpoolKind};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "MEMLOG_CONFIG";

/// Errors from reading or writing the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub split: SplitConfig,
    pub compress: CompressConfig,
    pub report: ReportConfig,
}

/// `[split]`: trace classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Where spooled writes live while blocks are open
    pub spool: SpoolKind,
    /// Ignore blocks smaller than this many bytes
    pub min_block_size: u64,
    /// Log progress every N lines (0 = never)
    pub progress_every: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let options = ClassifierOptions::default();
        Self {
            spool: SpoolKind::default(),
            min_block_size: options.min_block_size,
            progress_every: options.progress_every,
        }
    }
}

impl SplitConfig {
    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            min_block_size: self.min_block_size,
            progress_every: self.progress_every,
        }
    }
}

/// `[compress]`: analyzer orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    /// Analyzer program, looked up in PATH unless it contains a separator
    pub analyzer: String,
    /// Extra arguments placed before the artifact and output paths
    pub analyzer_args: Vec<String>,
    /// Worker threads (0 = all cores but one)
    pub workers: usize,
    /// Total attempts per artifact
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    /// Delay before the first retry, doubled for each further one
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Fraction of RAM in use above which retries are held
    pub memory_high_water: f64,
    /// Kill an analyzer run after this long (0 = never)
    pub task_timeout_secs: u64,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            analyzer: "ulr-compress".to_string(),
            analyzer_args: Vec::new(),
            workers: 0,
            max_attempts: 3,
            poll_interval_ms: 1000,
            retry_backoff_ms: 5000,
            max_backoff_ms: 300_000,
            memory_high_water: 0.90,
            task_timeout_secs: 0,
        }
    }
}

impl CompressConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        }
    }

    pub fn orchestrator_config(&self, results_dir: impl Into<PathBuf>) -> OrchestratorConfig {
        OrchestratorConfig {
            workers: self.effective_workers(),
            max_attempts: self.max_attempts.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            memory_high_water: self.memory_high_water,
            results_dir: results_dir.into(),
        }
    }

    pub fn analyzer(&self) -> ExternalAnalyzer {
        let timeout = (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs));
        ExternalAnalyzer::new(&self.analyzer)
            .with_args(self.analyzer_args.clone())
            .with_timeout(timeout)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// `[report]`: output of `report` and `run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
}

impl Config {
    /// Location of the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("memlog").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location, falling back to defaults if the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.to_toml()?).map_err(write_err)
    }
}
