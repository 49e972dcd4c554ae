//! Drives the analyzer over a set of artifacts.
//!
//! One coordinating thread owns all task state: the queue of first attempts,
//! the retry queue ordered by not-before time, the in-flight set and the
//! outcome list. Workers only ever run one analyzer invocation and send a
//! [`Completion`] back over a channel. The coordinator polls that channel on
//! a fixed interval instead of joining, since a single invocation may run for
//! hours, and samples memory pressure on every tick.
//!
//! Task lifecycle:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!                    -> Recoverable -> Pending (until max_attempts) -> PermanentlyFailed
//!                    -> Unrecoverable
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::analyzer::Analyzer;
use super::memory::{MemoryMonitor, SystemMemoryMonitor};
use super::outcome::{classify_attempt, AttemptReport, CompressionOutcome, OutcomeStatus, Verdict};
use super::pool::{Job, PoolError, RayonPool, WorkerPool};
use crate::artifact::ArtifactRecord;

/// Shortest time the coordinator blocks waiting for completions.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Upper bound on any retry delay, whatever the configured backoff.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default number of attempts per artifact.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Settings for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workers: usize,
    /// Total attempts per artifact, first one included.
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Delay before the first retry; doubles with every further attempt.
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
    /// Fraction of memory in use above which retries are held back.
    pub memory_high_water: f64,
    pub results_dir: PathBuf,
}

impl OrchestratorConfig {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers: default_workers(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            memory_high_water: 0.90,
            results_dir: results_dir.into(),
        }
    }

    /// Wait before the attempt following `attempts` failed ones.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
            .min(MAX_RETRY_DELAY)
    }
}

/// When a retry delayed by `backoff` from `now` becomes eligible. Never
/// panics, even for delays past what the clock can represent.
fn retry_due(now: Instant, backoff: Duration) -> Instant {
    now.checked_add(backoff)
        .or_else(|| now.checked_add(MAX_RETRY_DELAY))
        .unwrap_or(now)
}

/// All available cores but one, and at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

/// Where the analyzer output for `artifact` goes.
pub fn output_path_for(results_dir: &Path, artifact: &ArtifactRecord) -> PathBuf {
    results_dir.join(format!("{}.out", artifact.file_name()))
}

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("Failed to create results directory {path}: {source}")]
    ResultsDir { path: PathBuf, source: io::Error },
}

/// Everything a run produced.
#[derive(Debug)]
pub struct OrchestrationReport {
    /// One per eligible artifact, in input order.
    pub outcomes: Vec<CompressionOutcome>,
    /// `distVar` artifacts, never attempted.
    pub skipped: Vec<ArtifactRecord>,
    /// Some or all tasks ran on the coordinator thread after the pool failed.
    pub sequential_fallback: bool,
}

impl OrchestrationReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Artifacts that exhausted their retries.
    pub fn critical_failures(&self) -> Vec<&CompressionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::PermanentlyFailed)
            .collect()
    }
}

struct Task {
    id: usize,
    artifact: ArtifactRecord,
    attempts: u32,
}

/// Message from a worker to the coordinator.
struct Completion {
    task_id: usize,
    report: AttemptReport,
}

/// Delivers exactly one completion for a task.
///
/// If the job is dropped before it reports (the worker died, the pool threw
/// the job away) a recoverable failure is sent in its place so the task is
/// never lost.
struct Reporter {
    task_id: usize,
    tx: Option<Sender<Completion>>,
}

impl Reporter {
    fn new(task_id: usize, tx: Sender<Completion>) -> Self {
        Self {
            task_id,
            tx: Some(tx),
        }
    }

    fn send(mut self, report: AttemptReport) {
        self.deliver(report);
    }

    fn deliver(&mut self, report: AttemptReport) {
        if let Some(tx) = self.tx.take() {
            // Ignore send errors (coordinator may have exited)
            let _ = tx.send(Completion {
                task_id: self.task_id,
                report,
            });
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.deliver(AttemptReport::recoverable("worker exited without reporting"));
    }
}

/// Coordinator-owned bookkeeping.
struct RunState {
    pending: VecDeque<Task>,
    retries: BTreeMap<(Instant, usize), Task>,
    in_flight: HashMap<usize, Task>,
    outcomes: Vec<(usize, CompressionOutcome)>,
    memory_high: bool,
    last_sample: Option<Instant>,
}

impl RunState {
    fn new(artifacts: Vec<ArtifactRecord>) -> Self {
        let pending = artifacts
            .into_iter()
            .enumerate()
            .map(|(id, artifact)| Task {
                id,
                artifact,
                attempts: 0,
            })
            .collect();
        Self {
            pending,
            retries: BTreeMap::new(),
            in_flight: HashMap::new(),
            outcomes: Vec::new(),
            memory_high: false,
            last_sample: None,
        }
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.retries.is_empty() && self.in_flight.is_empty()
    }

    /// Key of the retry that may start now, if any.
    ///
    /// Retries wait for their backoff and, while memory pressure is high, for
    /// the in-flight set to drain. With nothing in flight the pressure is not
    /// ours to relieve, so the retry goes ahead.
    fn released_retry(&self, now: Instant) -> Option<(Instant, usize)> {
        let &(due, id) = self.retries.keys().next()?;
        if due > now || (self.memory_high && !self.in_flight.is_empty()) {
            return None;
        }
        Some((due, id))
    }

    fn has_ready(&self, now: Instant) -> bool {
        !self.pending.is_empty() || self.released_retry(now).is_some()
    }

    fn next_ready(&mut self, now: Instant) -> Option<Task> {
        if let Some(key) = self.released_retry(now) {
            return self.retries.remove(&key);
        }
        self.pending.pop_front()
    }

    fn next_retry_due(&self) -> Option<Instant> {
        self.retries.keys().next().map(|&(due, _)| due)
    }
}

/// Runs the analyzer over artifacts with bounded parallelism and retries.
pub struct CompressionOrchestrator {
    analyzer: Arc<dyn Analyzer>,
    monitor: Box<dyn MemoryMonitor>,
    config: OrchestratorConfig,
}

impl CompressionOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>, config: OrchestratorConfig) -> Self {
        Self {
            analyzer,
            monitor: Box::new(SystemMemoryMonitor::new()),
            config,
        }
    }

    /// Replace the memory pressure source.
    pub fn with_monitor(mut self, monitor: Box<dyn MemoryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every artifact on a fresh `rayon` pool, or sequentially if the
    /// pool cannot be built.
    pub fn run(
        &mut self,
        artifacts: Vec<ArtifactRecord>,
    ) -> Result<OrchestrationReport, CompressError> {
        match RayonPool::new(self.config.workers) {
            Ok(pool) => self.run_with_pool(artifacts, Some(&pool)),
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, running sequentially");
                self.run_with_pool(artifacts, None)
            }
        }
    }

    /// Run every artifact on `pool`, or on the calling thread when `None`.
    pub fn run_with_pool(
        &mut self,
        artifacts: Vec<ArtifactRecord>,
        pool: Option<&dyn WorkerPool>,
    ) -> Result<OrchestrationReport, CompressError> {
        fs::create_dir_all(&self.config.results_dir).map_err(|source| {
            CompressError::ResultsDir {
                path: self.config.results_dir.clone(),
                source,
            }
        })?;

        let (eligible, skipped): (Vec<_>, Vec<_>) = artifacts
            .into_iter()
            .partition(|a| a.label().is_compressible());
        for artifact in &skipped {
            debug!(artifact = %artifact.name, "not compressible, skipping");
        }

        info!(
            analyzer = self.analyzer.name(),
            eligible = eligible.len(),
            skipped = skipped.len(),
            workers = pool.map(|p| p.workers()).unwrap_or(1),
            "starting compression"
        );

        let mut state = RunState::new(eligible);
        let mut pool = pool;
        let mut sequential_fallback = pool.is_none();
        let (tx, rx) = mpsc::channel();

        while !state.is_done() {
            self.sample_memory(&mut state);

            match pool {
                Some(p) => {
                    if let Err(e) = self.dispatch(p, &mut state, &tx) {
                        warn!(error = %e, "worker pool failed, continuing sequentially");
                        pool = None;
                        sequential_fallback = true;
                    }
                }
                None => {
                    if let Some(mut task) = state.next_ready(Instant::now()) {
                        task.attempts += 1;
                        debug!(artifact = %task.artifact.name, attempt = task.attempts, "running inline");
                        let report = attempt(
                            self.analyzer.as_ref(),
                            &task.artifact,
                            &self.config.results_dir,
                        );
                        self.settle(task, report, &mut state);
                    }
                }
            }

            let wait = self.wait_hint(&state, pool.is_some());
            match rx.recv_timeout(wait) {
                Ok(completion) => self.complete(completion, &mut state),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Unreachable while `tx` is alive; never spin on lost work
                    for (_, task) in state.in_flight.drain().collect::<Vec<_>>() {
                        let report = AttemptReport::recoverable("completion channel closed");
                        self.settle(task, report, &mut state);
                    }
                    pool = None;
                    sequential_fallback = true;
                }
            }
        }

        state.outcomes.sort_by_key(|(id, _)| *id);
        let report = OrchestrationReport {
            outcomes: state.outcomes.into_iter().map(|(_, o)| o).collect(),
            skipped,
            sequential_fallback,
        };

        info!(
            succeeded = report.count(OutcomeStatus::Succeeded),
            permanently_failed = report.count(OutcomeStatus::PermanentlyFailed),
            unrecoverable = report.count(OutcomeStatus::Unrecoverable),
            skipped = report.skipped.len(),
            "compression finished"
        );
        Ok(report)
    }

    /// Fill the pool up to its worker count.
    fn dispatch(
        &self,
        pool: &dyn WorkerPool,
        state: &mut RunState,
        tx: &Sender<Completion>,
    ) -> Result<(), PoolError> {
        let now = Instant::now();
        while state.in_flight.len() < pool.workers() {
            let Some(mut task) = state.next_ready(now) else {
                break;
            };
            task.attempts += 1;

            let job = self.job_for(&task, tx.clone());
            if let Err(e) = pool.submit(job) {
                task.attempts -= 1;
                state.pending.push_front(task);
                return Err(e);
            }

            debug!(artifact = %task.artifact.name, attempt = task.attempts, "dispatched");
            state.in_flight.insert(task.id, task);
        }
        Ok(())
    }

    fn job_for(&self, task: &Task, tx: Sender<Completion>) -> Job {
        let analyzer = Arc::clone(&self.analyzer);
        let artifact = task.artifact.clone();
        let results_dir = self.config.results_dir.clone();
        let reporter = Reporter::new(task.id, tx);

        Box::new(move || {
            let report = attempt(analyzer.as_ref(), &artifact, &results_dir);
            reporter.send(report);
        })
    }

    fn complete(&self, completion: Completion, state: &mut RunState) {
        match state.in_flight.remove(&completion.task_id) {
            Some(task) => self.settle(task, completion.report, state),
            None => debug!(task = completion.task_id, "ignoring completion for task not in flight"),
        }
    }

    /// Turn an attempt into either a terminal outcome or a scheduled retry.
    fn settle(&self, task: Task, report: AttemptReport, state: &mut RunState) {
        let max_attempts = self.config.max_attempts.max(1);
        let status = match report.verdict {
            Verdict::Succeeded => OutcomeStatus::Succeeded,
            Verdict::Unrecoverable => {
                warn!(artifact = %task.artifact.name, "analyzer hit a structural limit, not retrying");
                OutcomeStatus::Unrecoverable
            }
            Verdict::Recoverable if task.attempts < max_attempts => {
                let backoff = self.config.backoff_for(task.attempts);
                warn!(
                    artifact = %task.artifact.name,
                    attempt = task.attempts,
                    max_attempts,
                    retry_in = ?backoff,
                    reason = %first_line(&report.diagnostic),
                    "analyzer attempt failed"
                );
                state
                    .retries
                    .insert((retry_due(Instant::now(), backoff), task.id), task);
                return;
            }
            Verdict::Recoverable => {
                warn!(
                    artifact = %task.artifact.name,
                    attempts = task.attempts,
                    reason = %first_line(&report.diagnostic),
                    "analyzer failed, retries exhausted"
                );
                OutcomeStatus::PermanentlyFailed
            }
        };

        let output_path = output_path_for(&self.config.results_dir, &task.artifact);
        state.outcomes.push((
            task.id,
            CompressionOutcome {
                artifact: task.artifact,
                status,
                attempts: task.attempts,
                diagnostic: report.diagnostic,
                output_path,
            },
        ));
    }

    /// How long to block on the completion channel.
    fn wait_hint(&self, state: &RunState, pooled: bool) -> Duration {
        let poll = self.config.poll_interval.max(MIN_WAIT);
        let now = Instant::now();
        if !pooled && state.has_ready(now) {
            return Duration::ZERO;
        }
        match state.next_retry_due() {
            Some(due) if !state.memory_high || state.in_flight.is_empty() => {
                due.saturating_duration_since(now).max(MIN_WAIT).min(poll)
            }
            _ => poll,
        }
    }

    fn sample_memory(&mut self, state: &mut RunState) {
        let now = Instant::now();
        if state
            .last_sample
            .is_some_and(|t| now.duration_since(t) < self.config.poll_interval)
        {
            return;
        }
        state.last_sample = Some(now);

        let Some(pressure) = self.monitor.pressure() else {
            return;
        };
        let high = pressure > self.config.memory_high_water;
        if high != state.memory_high {
            if high {
                warn!(pressure, "memory pressure high, holding retries");
            } else {
                info!(pressure, "memory pressure subsided, resuming retries");
            }
        }
        state.memory_high = high;
    }
}

/// Run one analyzer attempt and classify it. Never panics.
pub fn attempt(analyzer: &dyn Analyzer, artifact: &ArtifactRecord, results_dir: &Path) -> AttemptReport {
    let output = output_path_for(results_dir, artifact);

    // A stale output from an earlier run must not pass for this attempt's
    match fs::remove_file(&output) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return AttemptReport::recoverable(format!(
                "failed to clear stale output {}: {}",
                output.display(),
                e
            ))
        }
    }

    let run = match panic::catch_unwind(AssertUnwindSafe(|| {
        analyzer.analyze(&artifact.path, &output)
    })) {
        Ok(run) => run,
        Err(_) => return AttemptReport::recoverable("analyzer worker panicked"),
    };

    let text = fs::read(&output)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    classify_attempt(&run, text.as_deref())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
