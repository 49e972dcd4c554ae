//! Single-pass trace classifier.
//!
//! Drives the event reader, keeps the interval registry in sync with open and
//! close records, routes stores to their block and hands retired blocks to the
//! finalizer. The pass never aborts on a bad line; only I/O failures on the
//! trace, the spool or the artifact directory are fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use super::block::AllocationBlock;
use super::event::TraceEvent;
use super::reader::EventReader;
use super::registry::IntervalRegistry;
use super::spool::{Extent, SpoolArena, SpoolKind};
use super::TraceError;
use crate::artifact::{AlignmentLabel, ArtifactRecord, BlockFinalizer};

/// Tunables for a classification pass.
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    /// Opens (and their closes) smaller than this many bytes are ignored.
    pub min_block_size: u64,
    /// Emit a progress event every this many lines. Zero disables it.
    pub progress_every: u64,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            min_block_size: 0,
            progress_every: 10_000_000,
        }
    }
}

/// Artifacts written per alignment label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub dist64: u64,
    pub dist32: u64,
    #[serde(rename = "distVar")]
    pub dist_var: u64,
}

impl LabelCounts {
    pub fn add(&mut self, label: AlignmentLabel) {
        match label {
            AlignmentLabel::Dist64 => self.dist64 += 1,
            AlignmentLabel::Dist32 => self.dist32 += 1,
            AlignmentLabel::DistVar => self.dist_var += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.dist64 + self.dist32 + self.dist_var
    }
}

/// Counters describing one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyStats {
    pub lines: u64,
    pub bytes: u64,
    pub malformed_lines: u64,
    pub opens: u64,
    pub closes: u64,
    /// Opens and closes skipped by the minimum block size filter.
    pub ignored_small: u64,
    pub writes_attributed: u64,
    /// Stores that fell outside every live block.
    pub writes_dropped: u64,
    /// Closes with no live block at their address.
    pub unmatched_closes: u64,
    /// Blocks still live when the trace ended.
    pub closed_at_end: u64,
    /// Finalized blocks that never saw a store.
    pub empty_blocks: u64,
    pub artifacts: LabelCounts,
    pub peak_live_blocks: usize,
    pub peak_spool_bytes: u64,
    pub spool_compactions: u64,
}

/// Result of a complete pass.
#[derive(Debug)]
pub struct ClassifyOutput {
    pub stats: ClassifyStats,
    pub artifacts: Vec<ArtifactRecord>,
}

pub struct TraceClassifier {
    registry: IntervalRegistry,
    spool: SpoolArena,
    finalizer: BlockFinalizer,
    options: ClassifierOptions,
    stats: ClassifyStats,
    artifacts: Vec<ArtifactRecord>,
    next_sequence: u64,
}

impl TraceClassifier {
    pub fn new(finalizer: BlockFinalizer, spool: SpoolArena, options: ClassifierOptions) -> Self {
        Self {
            registry: IntervalRegistry::new(),
            spool,
            finalizer,
            options,
            stats: ClassifyStats::default(),
            artifacts: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Number of blocks currently live.
    pub fn live_blocks(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> &ClassifyStats {
        &self.stats
    }

    /// Apply one event.
    pub fn observe(&mut self, event: TraceEvent) -> Result<(), TraceError> {
        match event {
            TraceEvent::Open { start, size } => {
                if size < self.options.min_block_size {
                    self.stats.ignored_small += 1;
                    return Ok(());
                }
                self.stats.opens += 1;
                let block = AllocationBlock::new(start, size, self.next_sequence);
                self.next_sequence += 1;
                self.registry.insert(block);
                self.stats.peak_live_blocks = self.stats.peak_live_blocks.max(self.registry.len());
            }
            TraceEvent::Write { address, value } => {
                let Some(block) = self.registry.find_containing(address) else {
                    self.stats.writes_dropped += 1;
                    return Ok(());
                };
                let Some(record) = block.record_for(address, value) else {
                    self.stats.writes_dropped += 1;
                    return Ok(());
                };
                let extent = self.spool.append(&record).map_err(TraceError::Spool)?;
                block.record_write(&record, extent);
                self.stats.writes_attributed += 1;
            }
            TraceEvent::Close { start, size } => {
                if size < self.options.min_block_size {
                    self.stats.ignored_small += 1;
                    return Ok(());
                }
                match self.registry.remove_most_recent_at(start) {
                    Some(block) => {
                        self.stats.closes += 1;
                        self.retire(block)?;
                        if self.registry.is_empty() {
                            self.stats.peak_spool_bytes =
                                self.stats.peak_spool_bytes.max(self.spool.peak());
                            self.spool.rewind();
                        } else if self.spool.wants_compaction() {
                            self.compact_spool()?;
                        }
                    }
                    None => {
                        debug!(start = %format!("{:#x}", start), "close without live block");
                        self.stats.unmatched_closes += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read `input` to the end and finalize everything.
    pub fn run<R: BufRead>(mut self, input: R) -> Result<ClassifyOutput, TraceError> {
        let mut reader = EventReader::new(input);
        let mut next_progress = self.options.progress_every;

        while let Some(event) = reader.next() {
            self.observe(event?)?;

            if next_progress > 0 && reader.stats().lines >= next_progress {
                info!(
                    lines = reader.stats().lines,
                    live_blocks = self.registry.len(),
                    artifacts = self.artifacts.len(),
                    "classifying trace"
                );
                next_progress += self.options.progress_every;
            }
        }

        let read = reader.stats();
        self.stats.lines = read.lines;
        self.stats.bytes = read.bytes;
        self.stats.malformed_lines = read.malformed;
        self.finish()
    }

    /// Finalize every block that is still live, as if it had been closed.
    pub fn finish(mut self) -> Result<ClassifyOutput, TraceError> {
        let remaining = self.registry.drain();
        if !remaining.is_empty() {
            info!(blocks = remaining.len(), "finalizing blocks still live at end of trace");
        }
        for block in remaining {
            self.stats.closed_at_end += 1;
            self.retire(block)?;
        }
        self.stats.peak_spool_bytes = self.stats.peak_spool_bytes.max(self.spool.peak());

        Ok(ClassifyOutput {
            stats: self.stats,
            artifacts: self.artifacts,
        })
    }

    fn retire(&mut self, block: AllocationBlock) -> Result<(), TraceError> {
        self.spool.release(block.extents());
        match self.finalizer.finalize(block, &mut self.spool)? {
            Some(record) => {
                self.stats.artifacts.add(record.label());
                self.artifacts.push(record);
            }
            None => self.stats.empty_blocks += 1,
        }
        Ok(())
    }

    fn compact_spool(&mut self) -> Result<(), TraceError> {
        let before = self.spool.len();
        let mut live: Vec<&mut Extent> = self
            .registry
            .blocks_mut()
            .flat_map(AllocationBlock::extents_mut)
            .collect();
        self.spool.compact(&mut live).map_err(TraceError::Spool)?;
        for block in self.registry.blocks_mut() {
            block.coalesce_extents();
        }
        self.stats.spool_compactions += 1;
        debug!(before, after = self.spool.len(), "compacted spool");
        Ok(())
    }
}

/// Classify the trace at `trace`, writing artifacts into `out_dir`.
///
/// Disk spools are created inside `out_dir` so the scratch space lives on the
/// same filesystem as the results.
pub fn classify_file(
    trace: &Path,
    out_dir: &Path,
    spool: SpoolKind,
    options: ClassifierOptions,
) -> Result<ClassifyOutput, TraceError> {
    if !trace.is_file() {
        return Err(TraceError::NotFound {
            path: trace.to_path_buf(),
        });
    }
    let file = File::open(trace).map_err(|source| TraceError::Open {
        path: trace.to_path_buf(),
        source,
    })?;

    let finalizer = BlockFinalizer::create(out_dir)?;
    let spool = SpoolArena::open(spool, Some(out_dir)).map_err(TraceError::Spool)?;

    info!(
        trace = %trace.display(),
        out = %out_dir.display(),
        "splitting trace by allocation block"
    );
    TraceClassifier::new(finalizer, spool, options).run(BufReader::with_capacity(1 << 20, file))
}
