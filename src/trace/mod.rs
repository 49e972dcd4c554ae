//! Streaming classification of memory-write traces.
//!
//! A trace is read once, front to back. Open records create live blocks in an
//! ordered registry, stores are routed to the block that contains their
//! address, and close records (or the end of the trace) hand blocks to the
//! finalizer which persists them as artifacts.
//!
//! # Module Structure
//!
//! - [`event`] - Line grammar and typed events
//! - [`reader`] - Lazy event reader over any `BufRead`
//! - [`block`] - Live state of one allocation
//! - [`registry`] - Ordered index of live blocks
//! - [`spool`] - Shared append-only store for spooled writes
//! - [`classifier`] - The single-pass driver

pub mod block;
pub mod classifier;
pub mod event;
pub mod reader;
pub mod registry;
pub mod spool;

use std::io;
use std::path::PathBuf;

use crate::artifact::ArtifactError;

pub use block::AllocationBlock;
pub use classifier::{
    classify_file, ClassifierOptions, ClassifyOutput, ClassifyStats, LabelCounts, TraceClassifier,
};
pub use event::TraceEvent;
pub use reader::{EventReader, ReaderStats};
pub use registry::IntervalRegistry;
pub use spool::{Extent, SpoolArena, SpoolKind, WriteRecord};

/// Errors that stop a classification pass.
///
/// Bad lines never end up here; they are skipped and counted.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Trace file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to open trace {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to read trace: {0}")]
    Read(#[source] io::Error),

    #[error("Spool I/O failed: {0}")]
    Spool(#[source] io::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
