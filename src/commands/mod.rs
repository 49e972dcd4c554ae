//! Subcommand handlers.

pub mod completions;
pub mod compress;
pub mod config;
pub mod report;
pub mod run;
pub mod split;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;

use memlog::compress::OrchestrationReport;
use memlog::config::ReportFormat;
use memlog::report::{render_json, render_text, AggregateReport};
use memlog::Config;

/// Exit status when `--fail-on-critical` is set and an artifact exhausted
/// its retries.
pub const CRITICAL_FAILURE_EXIT: u8 = 3;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// `path` with `suffix` appended to its last component.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Artifact directory for a trace: `<trace>.parsed`.
pub fn default_artifacts_dir(trace: &Path) -> PathBuf {
    with_suffix(trace, ".parsed")
}

/// Results directory for an artifact directory: `<artifacts>.results`.
pub fn default_results_dir(artifacts: &Path) -> PathBuf {
    let trimmed = artifacts
        .to_str()
        .map(|s| Path::new(s.trim_end_matches('/')))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(artifacts);
    with_suffix(trimmed, ".results")
}

pub fn print_report(report: &AggregateReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => print!("{}", render_text(report)),
        ReportFormat::Json => println!(
            "{}",
            render_json(report, Utc::now()).context("Failed to serialize report")?
        ),
    }
    Ok(())
}

pub fn exit_code(report: &OrchestrationReport, fail_on_critical: bool) -> ExitCode {
    if fail_on_critical && !report.critical_failures().is_empty() {
        ExitCode::from(CRITICAL_FAILURE_EXIT)
    } else {
        ExitCode::SUCCESS
    }
}
