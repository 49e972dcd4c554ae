//! Compress command handler

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

use memlog::artifact::scan_dir;
use memlog::cli::CompressCommand;
use memlog::compress::{Analyzer, CompressionOrchestrator, OrchestrationReport};
use memlog::config::CompressConfig;
use memlog::report::ResultAggregator;
use memlog::{ArtifactRecord, Config};

use super::{default_results_dir, exit_code, print_report};

/// Run the analyzer over an existing artifact directory.
#[cfg(not(tarpaulin_include))]
pub fn handle(cmd: &CompressCommand, config: &Config) -> Result<ExitCode> {
    let mut compress = config.compress.clone();
    cmd.analyzer.apply(&mut compress);

    let results_dir = cmd
        .results
        .clone()
        .unwrap_or_else(|| default_results_dir(&cmd.artifacts));
    let artifacts = scan_dir(&cmd.artifacts)
        .with_context(|| format!("Failed to list artifacts in {}", cmd.artifacts.display()))?;

    let report = compress_artifacts(artifacts, &results_dir, &compress)?;

    let mut aggregator = ResultAggregator::new();
    aggregator.add_orchestration(&report);
    print_report(
        &aggregator.finish(),
        cmd.format.unwrap_or(config.report.format),
    )?;

    Ok(exit_code(&report, cmd.analyzer.fail_on_critical))
}

/// Orchestrate the analyzer over `artifacts`.
///
/// A missing analyzer is fatal only if there is something to compress.
pub fn compress_artifacts(
    artifacts: Vec<ArtifactRecord>,
    results_dir: &Path,
    config: &CompressConfig,
) -> Result<OrchestrationReport> {
    let analyzer = config.analyzer();
    let needs_analyzer = artifacts.iter().any(|a| a.label().is_compressible());
    if needs_analyzer && !analyzer.is_available() {
        bail!(
            "Analyzer '{}' not found. Set [compress] analyzer in the config or pass --analyzer",
            analyzer.program().display()
        );
    }

    let mut orchestrator =
        CompressionOrchestrator::new(Arc::new(analyzer), config.orchestrator_config(results_dir));
    let report = orchestrator
        .run(artifacts)
        .context("Compression could not start")?;

    if report.sequential_fallback {
        warn!("some artifacts were compressed sequentially after a worker pool failure");
    }
    for failure in report.critical_failures() {
        warn!(artifact = %failure.artifact.name, "critical failure: retries exhausted");
    }
    Ok(report)
}
