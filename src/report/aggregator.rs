//! Per-artifact rows and run totals.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use super::diagnostic::AnalyzerDiagnostic;
use crate::artifact::{AlignmentLabel, ArtifactRecord};
use crate::compress::{output_path_for, CompressionOutcome, OrchestrationReport, OutcomeStatus};
use crate::trace::event::parse_hex;

/// What happened to an artifact, as far as the report is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Compressed,
    /// Retries exhausted.
    Failed,
    Unrecoverable,
    /// `distVar`, never attempted.
    Skipped,
    /// Compressible but no analyzer output exists yet.
    NotRun,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::Failed => "failed",
            Self::Unrecoverable => "unrecoverable",
            Self::Skipped => "skipped",
            Self::NotRun => "not_run",
        }
    }
}

impl From<OutcomeStatus> for RowStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Succeeded => Self::Compressed,
            OutcomeStatus::PermanentlyFailed => Self::Failed,
            OutcomeStatus::Unrecoverable => Self::Unrecoverable,
        }
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub label: AlignmentLabel,
    /// `None` if the artifact could not be read.
    pub all_zero: Option<bool>,
    pub status: RowStatus,
    /// `None` when the artifact was not attempted in this process.
    pub attempts: Option<u32>,
    pub ulr_miss_qty: Option<u64>,
    pub miss_counts: BTreeMap<String, u64>,
    pub reduction_pct: Option<f64>,
    pub lossless: Option<bool>,
}

impl ReportRow {
    /// Estimated size after compression. Blocks that did not compress count
    /// at full size.
    pub fn compressed_bytes(&self) -> u64 {
        match (self.status, self.reduction_pct) {
            (RowStatus::Compressed, Some(pct)) => {
                let kept = (1.0 - pct.clamp(0.0, 100.0) / 100.0) * self.size as f64;
                kept.round() as u64
            }
            _ => self.size,
        }
    }
}

/// Run-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportTotals {
    /// Artifacts that reached a terminal analyzer outcome.
    pub processed: u64,
    pub lossless_successes: u64,
    /// Sum of block sizes over compressible labels.
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub skipped_var: u64,
    pub failed: u64,
    pub unrecoverable: u64,
    pub not_run: u64,
    /// Names of artifacts that exhausted their retries.
    pub critical_failures: Vec<String>,
}

impl ReportTotals {
    /// Overall reduction over compressible bytes, in percent.
    pub fn reduction_pct(&self) -> Option<f64> {
        if self.original_bytes == 0 {
            return None;
        }
        Some(100.0 * (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64))
    }
}

/// Finished report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub rows: Vec<ReportRow>,
    pub totals: ReportTotals,
}

/// Accumulates rows and totals.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    rows: Vec<ReportRow>,
    totals: ReportTotals,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal outcome of one analyzed artifact.
    pub fn add_outcome(&mut self, outcome: &CompressionOutcome) -> &ReportRow {
        let diag = match outcome.status {
            OutcomeStatus::Succeeded | OutcomeStatus::Unrecoverable => {
                AnalyzerDiagnostic::parse(outcome.diagnostic())
            }
            // Failure text is ours, not the analyzer's
            OutcomeStatus::PermanentlyFailed => AnalyzerDiagnostic::default(),
        };
        self.push(
            &outcome.artifact,
            outcome.status.into(),
            Some(outcome.attempts),
            diag,
        )
    }

    /// Record an artifact that is never attempted.
    pub fn add_skipped(&mut self, artifact: &ArtifactRecord) -> &ReportRow {
        self.push(artifact, RowStatus::Skipped, None, AnalyzerDiagnostic::default())
    }

    pub fn add_orchestration(&mut self, report: &OrchestrationReport) {
        for outcome in &report.outcomes {
            self.add_outcome(outcome);
        }
        for artifact in &report.skipped {
            self.add_skipped(artifact);
        }
    }

    /// Rebuild rows from output files left by an earlier run.
    ///
    /// A missing output means the artifact was never analyzed. An output
    /// carrying a structural-limit marker is unrecoverable, one with a size
    /// reduction is compressed, anything else is counted as failed.
    pub fn add_from_results_dir(&mut self, artifacts: &[ArtifactRecord], results_dir: &Path) {
        for artifact in artifacts {
            if !artifact.label().is_compressible() {
                self.add_skipped(artifact);
                continue;
            }

            let output = output_path_for(results_dir, artifact);
            let text = match fs::read(&output) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.push(artifact, RowStatus::NotRun, None, AnalyzerDiagnostic::default());
                    continue;
                }
                Err(e) => {
                    warn!(path = %output.display(), error = %e, "unreadable analyzer output");
                    String::new()
                }
            };

            let diag = AnalyzerDiagnostic::parse(&text);
            let status = if diag.is_unrecoverable() {
                RowStatus::Unrecoverable
            } else if diag.reduction_pct.is_some() {
                RowStatus::Compressed
            } else {
                RowStatus::Failed
            };
            self.push(artifact, status, None, diag);
        }
    }

    pub fn totals(&self) -> &ReportTotals {
        &self.totals
    }

    /// Rows in artifact order.
    pub fn finish(mut self) -> AggregateReport {
        self.rows.sort_by(|a, b| {
            (a.start, a.size, a.label, &a.name).cmp(&(b.start, b.size, b.label, &b.name))
        });
        AggregateReport {
            rows: self.rows,
            totals: self.totals,
        }
    }

    fn push(
        &mut self,
        artifact: &ArtifactRecord,
        status: RowStatus,
        attempts: Option<u32>,
        diag: AnalyzerDiagnostic,
    ) -> &ReportRow {
        let all_zero = artifact.all_zero.or_else(|| match scan_all_zero(&artifact.path) {
            Ok(all_zero) => Some(all_zero),
            Err(e) => {
                warn!(path = %artifact.path.display(), error = %e, "failed to scan artifact");
                None
            }
        });

        let row = ReportRow {
            name: artifact.file_name(),
            start: artifact.start(),
            size: artifact.size(),
            label: artifact.label(),
            all_zero,
            status,
            attempts,
            ulr_miss_qty: diag.ulr_miss_qty(),
            reduction_pct: diag.reduction_pct,
            lossless: diag.lossless,
            miss_counts: diag.miss_counts,
        };
        self.tally(&row);
        debug!(artifact = %row.name, status = row.status.as_str(), "row added");

        self.rows.push(row);
        &self.rows[self.rows.len() - 1]
    }

    fn tally(&mut self, row: &ReportRow) {
        let totals = &mut self.totals;
        match row.status {
            RowStatus::Compressed => {
                totals.processed += 1;
                if row.lossless == Some(true) {
                    totals.lossless_successes += 1;
                }
            }
            RowStatus::Failed => {
                totals.processed += 1;
                totals.failed += 1;
                totals.critical_failures.push(row.name.clone());
            }
            RowStatus::Unrecoverable => {
                totals.processed += 1;
                totals.unrecoverable += 1;
            }
            RowStatus::Skipped => totals.skipped_var += 1,
            RowStatus::NotRun => totals.not_run += 1,
        }

        if row.label.is_compressible() {
            totals.original_bytes += row.size;
            totals.compressed_bytes += row.compressed_bytes();
        }
    }
}

/// Whether every value stored in an artifact is zero.
///
/// Lines that do not carry a value are ignored. An artifact without any value
/// line counts as all zero.
pub fn scan_all_zero(path: &Path) -> io::Result<bool> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let value = line.split_whitespace().nth(1).and_then(parse_hex);
        if matches!(value, Some(v) if v != 0) {
            return Ok(false);
        }
    }
    Ok(true)
}
