//! Trace line grammar.
//!
//! The trace is line oriented. Allocation and free records are bracketed by
//! delimiter lines and carry a `Start 0x<hex>, size <decimal>` header, stores
//! are bare `0x<address> 0x<value>` lines. Everything else (stack traces,
//! program output) is noise and ignored.

/// Opens an allocation record.
pub const ALLOC_START: &str = "===ALLOC START===";
/// Closes an allocation record.
pub const ALLOC_END: &str = "===ALLOC END===";
/// Opens a free record.
pub const FREE_START: &str = "===FREE START===";
/// Closes a free record.
pub const FREE_END: &str = "===FREE END===";

/// A typed trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// An allocation block became live.
    Open { start: u64, size: u64 },
    /// A store of `value` at `address`.
    Write { address: u64, value: u64 },
    /// The block at `start` was freed.
    Close { start: u64, size: u64 },
}

/// What a single raw line looks like, independent of its surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    AllocStart,
    AllocEnd,
    FreeStart,
    FreeEnd,
    /// `Start 0x<hex>, size <decimal>`
    Header { start: u64, size: u64 },
    /// `0x<hex> 0x<hex>`
    Write { address: u64, value: u64 },
    /// Looked like a header or a write but did not parse.
    Malformed,
    /// Anything else.
    Other,
}

/// Classify one line of trace text.
pub fn classify_line(line: &str) -> LineKind {
    let line = line.trim_end();

    match line {
        ALLOC_START => return LineKind::AllocStart,
        ALLOC_END => return LineKind::AllocEnd,
        FREE_START => return LineKind::FreeStart,
        FREE_END => return LineKind::FreeEnd,
        _ => {}
    }

    if let Some(rest) = line.strip_prefix("Start") {
        return match parse_header(rest) {
            Some((start, size)) => LineKind::Header { start, size },
            None => LineKind::Malformed,
        };
    }

    if line.starts_with("0x") || line.starts_with("0X") {
        return match parse_write(line) {
            Some((address, value)) => LineKind::Write { address, value },
            None => LineKind::Malformed,
        };
    }

    LineKind::Other
}

/// Parse the remainder of a header after the `Start` keyword.
fn parse_header(rest: &str) -> Option<(u64, u64)> {
    // The keyword must be followed by whitespace, not glued to the address
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let (address, tail) = rest.trim_start().split_once(',')?;
    let start = parse_hex(address.trim())?;

    let tail = tail.trim_start().strip_prefix("size")?;
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let tail = tail.trim_start();
    let digits_end = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());
    let size = tail[..digits_end].parse().ok()?;

    Some((start, size))
}

/// Parse a store line. Trailing columns are tolerated.
fn parse_write(line: &str) -> Option<(u64, u64)> {
    let mut tokens = line.split_whitespace();
    let address = parse_hex(tokens.next()?)?;
    let value = parse_hex(tokens.next()?)?;
    Some((address, value))
}

/// Parse a `0x`-prefixed hexadecimal token.
pub fn parse_hex(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
