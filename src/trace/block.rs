//! Live state of one allocation.

use super::spool::{Extent, WriteRecord};

/// One open-to-closed lifetime of a memory region.
///
/// The interval is `[start, end]` with `end = start + size`, inclusive on both
/// sides. Alignment flags start out true and only ever turn false.
#[derive(Debug, Clone)]
pub struct AllocationBlock {
    start: u64,
    size: u64,
    end: u64,
    /// Position of the open event among all opens of the trace.
    sequence: u64,
    aligned32: bool,
    aligned64: bool,
    write_count: u64,
    all_zero: bool,
    extents: Vec<Extent>,
}

impl AllocationBlock {
    pub fn new(start: u64, size: u64, sequence: u64) -> Self {
        Self {
            start,
            size,
            end: start.saturating_add(size),
            sequence,
            aligned32: true,
            aligned64: true,
            write_count: 0,
            all_zero: true,
            extents: Vec::new(),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Inclusive upper bound.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Every write offset so far is a multiple of 4 bytes.
    pub fn aligned32(&self) -> bool {
        self.aligned32
    }

    /// Every write offset so far is a multiple of 8 bytes.
    pub fn aligned64(&self) -> bool {
        self.aligned64
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Every recorded value was zero. Vacuously true without writes.
    pub fn all_zero(&self) -> bool {
        self.all_zero
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Extents for the spool to relocate during compaction.
    pub(crate) fn extents_mut(&mut self) -> &mut [Extent] {
        &mut self.extents
    }

    /// Merge extents that became adjacent after a relocation.
    pub(crate) fn coalesce_extents(&mut self) {
        self.extents.dedup_by(|next, prev| {
            if prev.end() == next.offset {
                prev.len += next.len;
                true
            } else {
                false
            }
        });
    }

    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address <= self.end
    }

    /// Build the record for a store at `address`, or `None` if it falls
    /// outside this block.
    pub fn record_for(&self, address: u64, value: u64) -> Option<WriteRecord> {
        self.contains(address).then(|| WriteRecord {
            address,
            value,
            offset: address - self.start,
        })
    }

    /// Account for a store that has been spooled at `extent`.
    pub fn record_write(&mut self, record: &WriteRecord, extent: Extent) {
        if record.offset % 4 != 0 {
            self.aligned32 = false;
        }
        if record.offset % 8 != 0 {
            self.aligned64 = false;
        }
        if record.value != 0 {
            self.all_zero = false;
        }
        self.write_count += 1;

        match self.extents.last_mut() {
            Some(last) if last.end() == extent.offset => last.len += extent.len,
            _ => self.extents.push(extent),
        }
    }
}
