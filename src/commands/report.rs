//! Report command handler

use std::process::ExitCode;

use anyhow::{Context, Result};

use memlog::artifact::scan_dir;
use memlog::cli::ReportCommand;
use memlog::report::ResultAggregator;
use memlog::Config;

use super::{default_results_dir, print_report};

/// Summarize the results of an earlier `compress` run.
#[cfg(not(tarpaulin_include))]
pub fn handle(cmd: &ReportCommand, config: &Config) -> Result<ExitCode> {
    let results_dir = cmd
        .results
        .clone()
        .unwrap_or_else(|| default_results_dir(&cmd.artifacts));
    let artifacts = scan_dir(&cmd.artifacts)
        .with_context(|| format!("Failed to list artifacts in {}", cmd.artifacts.display()))?;

    let mut aggregator = ResultAggregator::new();
    aggregator.add_from_results_dir(&artifacts, &results_dir);
    print_report(
        &aggregator.finish(),
        cmd.format.unwrap_or(config.report.format),
    )?;
    Ok(ExitCode::SUCCESS)
}
