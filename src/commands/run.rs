//! Run command handler: split, compress and report in one go

use std::process::ExitCode;

use anyhow::Result;

use memlog::cli::RunCommand;
use memlog::report::ResultAggregator;
use memlog::Config;

use super::compress::compress_artifacts;
use super::split::{print_split_summary, split_trace};
use super::{default_artifacts_dir, default_results_dir, exit_code, print_report};

#[cfg(not(tarpaulin_include))]
pub fn handle(cmd: &RunCommand, config: &Config) -> Result<ExitCode> {
    let mut split = config.split.clone();
    cmd.split.apply(&mut split);
    let mut compress = config.compress.clone();
    cmd.analyzer.apply(&mut compress);
    let format = cmd.format.unwrap_or(config.report.format);

    let out_dir = cmd
        .output
        .clone()
        .unwrap_or_else(|| default_artifacts_dir(&cmd.trace));
    let results_dir = cmd
        .results
        .clone()
        .unwrap_or_else(|| default_results_dir(&out_dir));

    let output = split_trace(&cmd.trace, &out_dir, &split)?;
    // Keep stdout pure JSON when asked for it
    if format == memlog::config::ReportFormat::Text {
        print_split_summary(&cmd.trace, &out_dir, &output);
        println!();
    }

    // Only this pass's artifacts; older ones in the directory are left alone
    let report = compress_artifacts(output.artifacts, &results_dir, &compress)?;

    let mut aggregator = ResultAggregator::new();
    aggregator.add_orchestration(&report);
    print_report(&aggregator.finish(), format)?;

    Ok(exit_code(&report, cmd.analyzer.fail_on_critical))
}
