//! Ordered index of live allocation blocks.
//!
//! Keys are start addresses. The same address can be reopened before its
//! previous lifetime was closed (realloc in place, missed frees), so every key
//! holds a stack of blocks: writes and closes always address the most recently
//! opened one.

use std::collections::BTreeMap;

use super::block::AllocationBlock;

#[derive(Debug, Default)]
pub struct IntervalRegistry {
    live: BTreeMap<u64, Vec<AllocationBlock>>,
    len: usize,
}

impl IntervalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live blocks, counting every entry of every stack.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, block: AllocationBlock) {
        self.live.entry(block.start()).or_default().push(block);
        self.len += 1;
    }

    /// Pop the most recently inserted block at `start`.
    pub fn remove_most_recent_at(&mut self, start: u64) -> Option<AllocationBlock> {
        let stack = self.live.get_mut(&start)?;
        let block = stack.pop();
        if stack.is_empty() {
            self.live.remove(&start);
        }
        if block.is_some() {
            self.len -= 1;
        }
        block
    }

    /// The live block whose interval contains `address`.
    ///
    /// Only the block with the greatest start `<= address` is considered; if
    /// that one does not reach `address` there is no match.
    pub fn find_containing(&mut self, address: u64) -> Option<&mut AllocationBlock> {
        let (_, stack) = self.live.range_mut(..=address).next_back()?;
        let candidate = stack.last_mut()?;
        if address <= candidate.end() {
            Some(candidate)
        } else {
            None
        }
    }

    /// Every live block, in no particular order.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut AllocationBlock> {
        self.live.values_mut().flatten()
    }

    /// Remove every live block, ordered by start address and, within one
    /// address, oldest first.
    pub fn drain(&mut self) -> Vec<AllocationBlock> {
        self.len = 0;
        std::mem::take(&mut self.live)
            .into_values()
            .flatten()
            .collect()
    }
}
