//! memlog - split memory-write traces by allocation block and drive a
//! compression analyzer over the results.
//!
//! The pipeline has three stages:
//!
//! 1. [`trace`] reads a trace once and writes one artifact per allocation
//!    block that saw at least one store, labeled by the alignment of its
//!    store offsets (see [`artifact`]).
//! 2. [`compress`] runs an external analyzer over the compressible artifacts
//!    with bounded parallelism, retries and memory-pressure throttling.
//! 3. [`report`] turns analyzer output into per-artifact rows and totals.

pub mod artifact;
pub mod cli;
pub mod compress;
pub mod config;
pub mod report;
pub mod trace;

pub use artifact::{AlignmentLabel, ArtifactName, ArtifactRecord, BlockFinalizer};
pub use config::Config;
