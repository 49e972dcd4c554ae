//! Persisted block write logs.
//!
//! An artifact is the write log of one finalized block. Its file name encodes
//! everything later stages need to know about the block:
//!
//! ```text
//! 0x<start-hex>_<size-decimal>_<label>[.<n>]
//! ```
//!
//! `<n>` disambiguates blocks that shared start, size and label across
//! different lifetimes. Each body line is `0x<addr> 0x<value> <offset>`.

mod finalizer;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use finalizer::BlockFinalizer;

/// Alignment class of a block's write offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlignmentLabel {
    /// Every offset is a multiple of 8 bytes.
    #[serde(rename = "dist64")]
    Dist64,
    /// Every offset is a multiple of 4 bytes, at least one is not of 8.
    #[serde(rename = "dist32")]
    Dist32,
    /// At least one offset is not a multiple of 4 bytes.
    #[serde(rename = "distVar")]
    DistVar,
}

impl AlignmentLabel {
    pub const ALL: [AlignmentLabel; 3] = [Self::Dist64, Self::Dist32, Self::DistVar];

    /// Pick the label from a block's alignment flags.
    pub fn from_flags(aligned32: bool, aligned64: bool) -> Self {
        match (aligned32, aligned64) {
            (true, true) => Self::Dist64,
            (true, false) => Self::Dist32,
            // 8-byte alignment implies 4-byte; anything else is variable
            (false, _) => Self::DistVar,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dist64 => "dist64",
            Self::Dist32 => "dist32",
            Self::DistVar => "distVar",
        }
    }

    /// Whether the analyzer is ever run on blocks with this label.
    pub fn is_compressible(&self) -> bool {
        !matches!(self, Self::DistVar)
    }
}

impl fmt::Display for AlignmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentLabel {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ArtifactError::InvalidName(s.to_string()))
    }
}

/// Identity of an artifact as encoded in its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactName {
    pub start: u64,
    pub size: u64,
    pub label: AlignmentLabel,
    pub disambiguator: Option<u64>,
}

impl ArtifactName {
    /// Name without the disambiguator suffix.
    pub fn base(&self) -> String {
        format!("{:#x}_{}_{}", self.start, self.size, self.label)
    }

    pub fn with_disambiguator(self, n: Option<u64>) -> Self {
        Self {
            disambiguator: n,
            ..self
        }
    }

    pub fn parse(name: &str) -> Result<Self, ArtifactError> {
        let invalid = || ArtifactError::InvalidName(name.to_string());

        let (base, disambiguator) = match name.split_once('.') {
            Some((base, n)) => {
                if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                (base, Some(n.parse().map_err(|_| invalid())?))
            }
            None => (name, None),
        };

        let mut parts = base.splitn(3, '_');
        let start = parts
            .next()
            .and_then(crate::trace::event::parse_hex)
            .ok_or_else(invalid)?;
        let size = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;
        let label = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            start,
            size,
            label,
            disambiguator,
        })
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base())?;
        if let Some(n) = self.disambiguator {
            write!(f, ".{}", n)?;
        }
        Ok(())
    }
}

/// A finalized, immutable block write log on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub name: ArtifactName,
    /// Known when produced in this process; `None` when scanned from disk.
    pub write_count: Option<u64>,
    /// Known when produced in this process; `None` when scanned from disk.
    pub all_zero: Option<bool>,
}

impl ArtifactRecord {
    /// Describe an existing artifact file from its name alone.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArtifactError::InvalidName(path.display().to_string()))?;
        let name = ArtifactName::parse(file_name)?;
        Ok(Self {
            path,
            name,
            write_count: None,
            all_zero: None,
        })
    }

    pub fn file_name(&self) -> String {
        self.name.to_string()
    }

    pub fn label(&self) -> AlignmentLabel {
        self.name.label
    }

    pub fn start(&self) -> u64 {
        self.name.start
    }

    pub fn size(&self) -> u64 {
        self.name.size
    }
}

/// List every artifact in `dir`, ordered by start, size, label, disambiguator.
///
/// Entries whose names do not follow the artifact scheme are skipped.
pub fn scan_dir(dir: &Path) -> Result<Vec<ArtifactRecord>, ArtifactError> {
    let scan_err = |source| ArtifactError::Scan {
        path: dir.to_path_buf(),
        source,
    };

    let mut records = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        if !entry.file_type().map_err(scan_err)?.is_file() {
            continue;
        }
        match ArtifactRecord::from_path(entry.path()) {
            Ok(record) => records.push(record),
            Err(_) => tracing::debug!(path = %entry.path().display(), "skipping non-artifact file"),
        }
    }
    records.sort_by_key(|r| r.name);
    Ok(records)
}

/// Errors from producing or locating artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Not an artifact name: {0}")]
    InvalidName(String),

    #[error("Failed to create artifact directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write artifact {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to scan artifact directory {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },

    #[error("No free artifact name left for {base}")]
    NamesExhausted { base: String },
}
