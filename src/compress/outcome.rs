//! Attempt verdicts and terminal task outcomes.

use std::path::PathBuf;

use serde::Serialize;

use super::analyzer::{AnalyzerError, AnalyzerRun};
use crate::artifact::ArtifactRecord;
use crate::report::AnalyzerDiagnostic;

/// How a single analyzer attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    /// Worth another attempt.
    Recoverable,
    /// The analyzer hit a structural limit; retrying cannot help.
    Unrecoverable,
}

/// Verdict plus the text that explains it.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub verdict: Verdict,
    pub diagnostic: String,
}

impl AttemptReport {
    pub fn recoverable(diagnostic: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Recoverable,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Decide the verdict of one attempt.
///
/// `output` is the content of the output file after the attempt, if it could
/// be read. A structural-limit marker in the output wins over everything else,
/// then any process-level failure, then a missing or empty output.
pub fn classify_attempt(
    run: &Result<AnalyzerRun, AnalyzerError>,
    output: Option<&str>,
) -> AttemptReport {
    let output = output.unwrap_or_default();

    if AnalyzerDiagnostic::parse(output).is_unrecoverable() {
        return AttemptReport {
            verdict: Verdict::Unrecoverable,
            diagnostic: output.to_string(),
        };
    }

    match run {
        Err(e) => AttemptReport::recoverable(join_nonempty(&[e.to_string().as_str(), output])),
        Ok(run) if !run.success => {
            let status = match run.exit_code {
                Some(code) => format!("analyzer exited with status {}", code),
                None => "analyzer killed by signal".to_string(),
            };
            AttemptReport::recoverable(join_nonempty(&[status.as_str(), run.stderr.as_str(), output]))
        }
        Ok(run) if output.trim().is_empty() => AttemptReport::recoverable(join_nonempty(&[
            "analyzer produced no output",
            run.stderr.as_str(),
        ])),
        Ok(_) => AttemptReport {
            verdict: Verdict::Succeeded,
            diagnostic: output.to_string(),
        },
    }
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    /// Every attempt failed recoverably and the retry ceiling was reached.
    PermanentlyFailed,
    /// The analyzer reported a limit it cannot overcome.
    Unrecoverable,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::PermanentlyFailed => "permanently_failed",
            Self::Unrecoverable => "unrecoverable",
        }
    }
}

/// Exactly one of these exists per attempted artifact.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub artifact: ArtifactRecord,
    pub status: OutcomeStatus,
    pub attempts: u32,
    /// Analyzer output on success, failure explanation otherwise.
    pub diagnostic: String,
    pub output_path: PathBuf,
}

impl CompressionOutcome {
    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    /// The failure was of the retryable kind (and retries ran out).
    pub fn recoverable(&self) -> bool {
        self.status == OutcomeStatus::PermanentlyFailed
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}
