//! Compression orchestration.
//!
//! Runs an external analyzer over every compressible artifact with bounded
//! parallelism. Failures are classified per attempt, recoverable ones are
//! retried with backoff, and retries are held while the host is short on
//! memory. If the worker pool cannot be used the remaining work runs on the
//! calling thread.
//!
//! # Module Structure
//!
//! - [`analyzer`] - The analyzer trait and its subprocess implementation
//! - [`outcome`] - Attempt verdicts and terminal outcomes
//! - [`memory`] - Memory pressure sampling
//! - [`pool`] - Bounded worker pool
//! - [`orchestrator`] - The coordinator loop

pub mod analyzer;
pub mod memory;
pub mod orchestrator;
pub mod outcome;
pub mod pool;

pub use analyzer::{command_exists, Analyzer, AnalyzerError, AnalyzerRun, ExternalAnalyzer};
pub use memory::{MemoryMonitor, SystemMemoryMonitor};
pub use orchestrator::{
    default_workers, output_path_for, CompressError, CompressionOrchestrator,
    OrchestrationReport, OrchestratorConfig, MAX_RETRY_DELAY,
};
pub use outcome::{classify_attempt, AttemptReport, CompressionOutcome, OutcomeStatus, Verdict};
pub use pool::{PoolError, RayonPool, WorkerPool};
