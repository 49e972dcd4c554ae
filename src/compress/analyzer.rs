//! External compression analyzer.
//!
//! The analyzer is an opaque program invoked as
//! `<program> [args...] <artifact> <output>`. It reports through its exit
//! status and the text it leaves in the output file; stderr is kept next to
//! the output for post-mortems.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running analyzer is checked against its timeout.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Longest stderr excerpt kept in a diagnostic.
const STDERR_EXCERPT_BYTES: usize = 2048;

/// Errors that can occur while invoking an analyzer.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Analyzer not available: {0}")]
    NotAvailable(String),

    #[error("Failed to spawn analyzer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to wait for analyzer: {0}")]
    Wait(#[source] std::io::Error),
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// What one finished invocation looked like from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerRun {
    pub success: bool,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Tail of the analyzer's stderr.
    pub stderr: String,
}

impl AnalyzerRun {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            stderr: stderr.into(),
        }
    }
}

/// Something that can analyze one artifact into one output file.
///
/// Implementations block until the analysis is over and are called from
/// worker threads, one artifact per call.
pub trait Analyzer: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Check if the analyzer can be run at all.
    fn is_available(&self) -> bool;

    /// Analyze `artifact`, leaving the diagnostic text in `output`.
    fn analyze(&self, artifact: &Path, output: &Path) -> AnalyzerResult<AnalyzerRun>;
}

/// The analyzer as a subprocess.
#[derive(Debug, Clone)]
pub struct ExternalAnalyzer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalAnalyzer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before the artifact and output paths.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Kill invocations that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Where stderr of the invocation producing `output` goes.
    pub fn stderr_path(output: &Path) -> PathBuf {
        output.with_extension("err")
    }
}

impl Analyzer for ExternalAnalyzer {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("analyzer")
    }

    fn is_available(&self) -> bool {
        command_exists(&self.program)
    }

    fn analyze(&self, artifact: &Path, output: &Path) -> AnalyzerResult<AnalyzerRun> {
        if !self.is_available() {
            return Err(AnalyzerError::NotAvailable(format!(
                "{} not found",
                self.program.display()
            )));
        }

        let stderr_path = Self::stderr_path(output);
        let stderr_file = File::create(&stderr_path)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(artifact)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()?;

        let status = match self.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout)?,
            None => child.wait().map_err(AnalyzerError::Wait)?,
        };

        let stderr = read_tail(&stderr_path, STDERR_EXCERPT_BYTES);
        Ok(AnalyzerRun {
            success: status.success(),
            exit_code: status.code(),
            stderr,
        })
    }
}

/// Wait for the child, killing it once `timeout` has elapsed.
///
/// Uses a simple polling approach since std::process doesn't have
/// native timeout support.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> AnalyzerResult<ExitStatus> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // Kill the process and reap it so it does not linger
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AnalyzerError::Timeout(timeout));
                }
                thread::sleep(WAIT_POLL_INTERVAL.min(timeout));
            }
            Err(e) => return Err(AnalyzerError::Wait(e)),
        }
    }
}

/// Last `limit` bytes of a file, lossily decoded. Empty if unreadable.
fn read_tail(path: &Path, limit: usize) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    let from = bytes.len().saturating_sub(limit);
    String::from_utf8_lossy(&bytes[from..]).trim().to_string()
}

/// Check whether `program` resolves to a file, either directly when it
/// contains a path separator or through `PATH`.
pub fn command_exists(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
