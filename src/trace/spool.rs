//! Shared write spool.
//!
//! Every live block's stores go into one append-only arena of fixed-size
//! records instead of one open file per block. Each block remembers the
//! extents it owns and its records are copied out only when it is finalized.
//! Retired extents are counted as dead. Once no block is live the arena
//! rewinds; while some are, it compacts itself as soon as dead bytes make up
//! more than half of it. Its size therefore stays within about twice the live
//! write set, or `COMPACT_MIN_BYTES`, whichever is larger.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Bytes per encoded record: address, value, offset as little-endian u64.
pub const RECORD_LEN: usize = 24;

/// Appends are buffered up to this many bytes before hitting the store.
const PENDING_LIMIT: usize = 64 * 1024;

/// Records decoded per read when copying an extent out.
const READ_CHUNK_RECORDS: usize = 4096;

/// Arenas smaller than this are never compacted.
pub const COMPACT_MIN_BYTES: u64 = 64 * 1024;

/// Where the spool keeps its bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SpoolKind {
    /// Anonymous temporary file, removed on drop.
    #[default]
    Disk,
    /// Heap buffer. Faster, but the live write set has to fit in RAM, and the
    /// buffer never shrinks below its high-water mark.
    Memory,
}

/// One store attributed to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u64,
    pub value: u64,
    /// `address - block.start`
    pub offset: u64,
}

impl WriteRecord {
    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..8].copy_from_slice(&self.address.to_le_bytes());
        out[8..16].copy_from_slice(&self.value.to_le_bytes());
        out[16..24].copy_from_slice(&self.offset.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Self {
        let word = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&bytes[i..i + 8]);
            u64::from_le_bytes(w)
        };
        Self {
            address: word(0),
            value: word(8),
            offset: word(16),
        }
    }
}

/// A contiguous byte range of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub len: u64,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Backing store for the arena.
trait SpoolStore: Read + Write + Seek {}

impl<T: Read + Write + Seek> SpoolStore for T {}

/// Append-only record arena.
pub struct SpoolArena {
    store: Box<dyn SpoolStore>,
    /// Bytes already written to `store`.
    flushed: u64,
    /// Bytes appended after `flushed`, not yet written.
    pending: Vec<u8>,
    /// Bytes owned by extents that have been released.
    dead: u64,
    peak: u64,
}

impl SpoolArena {
    /// Open a spool of the given kind. Disk spools are created in `dir`
    /// when given, otherwise in the system temporary directory.
    pub fn open(kind: SpoolKind, dir: Option<&Path>) -> io::Result<Self> {
        match kind {
            SpoolKind::Memory => Ok(Self::in_memory()),
            SpoolKind::Disk => {
                let file = match dir {
                    Some(dir) => tempfile::tempfile_in(dir)?,
                    None => tempfile::tempfile()?,
                };
                Ok(Self::on_file(file))
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::with_store(Box::new(Cursor::new(Vec::new())))
    }

    pub fn on_file(file: File) -> Self {
        Self::with_store(Box::new(file))
    }

    fn with_store(store: Box<dyn SpoolStore>) -> Self {
        Self {
            store,
            flushed: 0,
            pending: Vec::with_capacity(PENDING_LIMIT),
            dead: 0,
            peak: 0,
        }
    }

    /// Logical length of the arena in bytes.
    pub fn len(&self) -> u64 {
        self.flushed + self.pending.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest length the arena reached since it was opened.
    pub fn peak(&self) -> u64 {
        self.peak.max(self.len())
    }

    /// Append one record and return the extent it occupies.
    pub fn append(&mut self, record: &WriteRecord) -> io::Result<Extent> {
        let offset = self.len();
        self.pending.extend_from_slice(&record.encode());
        if self.pending.len() >= PENDING_LIMIT {
            self.flush()?;
        }
        Ok(Extent {
            offset,
            len: RECORD_LEN as u64,
        })
    }

    /// Visit every record in `extents`, in order.
    pub fn for_each_record<F>(&mut self, extents: &[Extent], mut visit: F) -> io::Result<()>
    where
        F: FnMut(WriteRecord) -> io::Result<()>,
    {
        if extents.iter().any(|e| e.end() > self.flushed) {
            self.flush()?;
        }

        let mut chunk = vec![0u8; READ_CHUNK_RECORDS * RECORD_LEN];
        for extent in extents {
            if extent.len % RECORD_LEN as u64 != 0 || extent.end() > self.flushed {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("spool extent {:?} out of bounds", extent),
                ));
            }

            self.store.seek(SeekFrom::Start(extent.offset))?;
            let mut remaining = extent.len as usize;
            while remaining > 0 {
                let take = remaining.min(chunk.len());
                self.store.read_exact(&mut chunk[..take])?;
                for bytes in chunk[..take].chunks_exact(RECORD_LEN) {
                    visit(WriteRecord::decode(bytes))?;
                }
                remaining -= take;
            }
        }
        Ok(())
    }

    /// Collect the records of `extents` into memory.
    pub fn read_records(&mut self, extents: &[Extent]) -> io::Result<Vec<WriteRecord>> {
        let mut records = Vec::new();
        self.for_each_record(extents, |r| {
            records.push(r);
            Ok(())
        })?;
        Ok(records)
    }

    /// Forget every record. Only valid once no extent is referenced any more.
    pub fn rewind(&mut self) {
        self.peak = self.peak();
        self.flushed = 0;
        self.pending.clear();
        self.dead = 0;
    }

    /// Mark `extents` as no longer referenced. Their records stay readable
    /// until the next `compact` or `rewind`.
    pub fn release(&mut self, extents: &[Extent]) {
        let bytes: u64 = extents.iter().map(|e| e.len).sum();
        self.dead = (self.dead + bytes).min(self.len());
    }

    pub fn dead_bytes(&self) -> u64 {
        self.dead
    }

    /// Dead bytes outweigh live ones in an arena worth compacting.
    pub fn wants_compaction(&self) -> bool {
        let len = self.len();
        len >= COMPACT_MIN_BYTES && self.dead > len / 2
    }

    /// Slide every extent in `live` towards the front of the arena, dropping
    /// the gaps left by released extents, and update them in place.
    ///
    /// `live` must name every extent still referenced; anything else is
    /// considered dead and may be overwritten.
    pub fn compact(&mut self, live: &mut [&mut Extent]) -> io::Result<()> {
        self.flush()?;
        self.peak = self.peak();
        live.sort_unstable_by_key(|e| e.offset);

        let mut chunk = vec![0u8; READ_CHUNK_RECORDS * RECORD_LEN];
        let mut cursor = 0u64;
        for extent in live.iter_mut() {
            if extent.offset < cursor || extent.end() > self.flushed {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("spool extent {:?} cannot be compacted", **extent),
                ));
            }
            // Destination never lies past the source, so a forward copy is safe
            let mut moved = 0u64;
            while extent.offset != cursor && moved < extent.len {
                let take = (extent.len - moved).min(chunk.len() as u64) as usize;
                self.store.seek(SeekFrom::Start(extent.offset + moved))?;
                self.store.read_exact(&mut chunk[..take])?;
                self.store.seek(SeekFrom::Start(cursor + moved))?;
                self.store.write_all(&chunk[..take])?;
                moved += take as u64;
            }
            extent.offset = cursor;
            cursor += extent.len;
        }

        self.flushed = cursor;
        self.dead = 0;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.seek(SeekFrom::Start(self.flushed))?;
        self.store.write_all(&self.pending)?;
        self.flushed += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

impl std::fmt::Debug for SpoolArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolArena")
            .field("flushed", &self.flushed)
            .field("pending", &self.pending.len())
            .field("dead", &self.dead)
            .finish()
    }
}
