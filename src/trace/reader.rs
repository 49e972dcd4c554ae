//! Lazy trace reader.
//!
//! Turns a byte stream into [`TraceEvent`]s with a small state machine over
//! the record delimiters. Lines are read as raw bytes and decoded lossily, so
//! binary garbage interleaved by the traced program cannot stop the pass.

use std::io::BufRead;

use super::event::{classify_line, LineKind, TraceEvent};
use super::TraceError;

/// Which delimited record the reader is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    None,
    Alloc,
    Free,
}

/// Line-level counters maintained by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub lines: u64,
    pub bytes: u64,
    pub malformed: u64,
}

/// Iterator of trace events over any buffered reader.
pub struct EventReader<R> {
    input: R,
    region: Region,
    buf: Vec<u8>,
    stats: ReaderStats,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            region: Region::None,
            buf: Vec::with_capacity(128),
            stats: ReaderStats::default(),
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Feed one decoded line through the state machine.
    fn step(&mut self, line: &str) -> Option<TraceEvent> {
        match classify_line(line) {
            LineKind::AllocStart => self.region = Region::Alloc,
            LineKind::FreeStart => self.region = Region::Free,
            LineKind::AllocEnd | LineKind::FreeEnd => self.region = Region::None,
            LineKind::Header { start, size } => {
                return match self.region {
                    Region::Alloc => Some(TraceEvent::Open { start, size }),
                    Region::Free => Some(TraceEvent::Close { start, size }),
                    // A header outside of a record carries no meaning
                    Region::None => None,
                };
            }
            LineKind::Write { address, value } => {
                return Some(TraceEvent::Write { address, value });
            }
            LineKind::Malformed => self.stats.malformed += 1,
            LineKind::Other => {}
        }
        None
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<TraceEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.input.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => {
                    self.stats.lines += 1;
                    self.stats.bytes += n as u64;
                }
                Err(e) => return Some(Err(TraceError::Read(e))),
            }

            let buf = std::mem::take(&mut self.buf);
            let event = self.step(&String::from_utf8_lossy(&buf));
            self.buf = buf;

            if let Some(event) = event {
                return Some(Ok(event));
            }
        }
    }
}
