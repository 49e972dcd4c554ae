//! Split command handler

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use memlog::cli::SplitCommand;
use memlog::config::SplitConfig;
use memlog::trace::{classify_file, ClassifyOutput};
use memlog::Config;

use super::default_artifacts_dir;

/// Split a trace into per-block artifacts.
#[cfg(not(tarpaulin_include))]
pub fn handle(cmd: &SplitCommand, config: &Config) -> Result<ExitCode> {
    let mut split = config.split.clone();
    cmd.split.apply(&mut split);

    let out_dir = cmd
        .output
        .clone()
        .unwrap_or_else(|| default_artifacts_dir(&cmd.trace));
    let output = split_trace(&cmd.trace, &out_dir, &split)?;
    print_split_summary(&cmd.trace, &out_dir, &output);
    Ok(ExitCode::SUCCESS)
}

pub fn split_trace(trace: &Path, out_dir: &Path, config: &SplitConfig) -> Result<ClassifyOutput> {
    classify_file(trace, out_dir, config.spool, config.classifier_options())
        .with_context(|| format!("Failed to split {}", trace.display()))
}

pub fn print_split_summary(trace: &Path, out_dir: &Path, output: &ClassifyOutput) {
    let stats = &output.stats;
    println!(
        "Split {} into {} artifact(s) in {}",
        trace.display(),
        stats.artifacts.total(),
        out_dir.display()
    );
    println!("  dist64:  {}", stats.artifacts.dist64);
    println!("  dist32:  {}", stats.artifacts.dist32);
    println!("  distVar: {}", stats.artifacts.dist_var);
    println!(
        "  lines: {} (malformed {}), blocks: {} opened, {} closed, {} open at end, {} without writes",
        stats.lines,
        stats.malformed_lines,
        stats.opens,
        stats.closes,
        stats.closed_at_end,
        stats.empty_blocks
    );
    println!(
        "  writes: {} attributed, {} outside any block",
        stats.writes_attributed, stats.writes_dropped
    );
}
