//! Turns closed blocks into artifact files.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{AlignmentLabel, ArtifactError, ArtifactName, ArtifactRecord};
use crate::trace::{AllocationBlock, SpoolArena};

/// Writes artifacts for finalized blocks into one directory.
#[derive(Debug)]
pub struct BlockFinalizer {
    dir: PathBuf,
    /// First suffix worth trying per base name: 0 is the bare name, n is `.n`.
    next_free: HashMap<ArtifactName, u64>,
}

impl BlockFinalizer {
    /// Use `dir` as the artifact directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            next_free: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Label for a block based on its alignment flags.
    pub fn label_for(block: &AllocationBlock) -> AlignmentLabel {
        AlignmentLabel::from_flags(block.aligned32(), block.aligned64())
    }

    /// Persist `block`'s write log.
    ///
    /// Blocks that saw no writes produce nothing. Existing files are never
    /// overwritten: a taken name gets the next free `.<n>` suffix. A file that
    /// fails to write is removed again.
    pub fn finalize(
        &mut self,
        block: AllocationBlock,
        spool: &mut SpoolArena,
    ) -> Result<Option<ArtifactRecord>, ArtifactError> {
        if block.write_count() == 0 {
            return Ok(None);
        }

        let name = ArtifactName {
            start: block.start(),
            size: block.size(),
            label: Self::label_for(&block),
            disambiguator: None,
        };
        let (file, name, path) = self.claim(name)?;

        if let Err(source) = Self::write_records(file, &block, spool) {
            let _ = fs::remove_file(&path);
            return Err(ArtifactError::Write { path, source });
        }

        debug!(
            artifact = %name,
            writes = block.write_count(),
            "finalized block"
        );

        Ok(Some(ArtifactRecord {
            path,
            name,
            write_count: Some(block.write_count()),
            all_zero: Some(block.all_zero()),
        }))
    }

    fn write_records(
        file: File,
        block: &AllocationBlock,
        spool: &mut SpoolArena,
    ) -> io::Result<()> {
        let mut out = BufWriter::new(file);
        spool.for_each_record(block.extents(), |record| {
            writeln!(
                out,
                "{:#x} {:#x} {}",
                record.address, record.value, record.offset
            )
        })?;
        out.flush()
    }

    /// Atomically create the first free file name derived from `name`.
    ///
    /// Scanning resumes where the last claim for the same base stopped, so
    /// reusing one address keeps costing a single `create_new` per block.
    fn claim(
        &mut self,
        name: ArtifactName,
    ) -> Result<(File, ArtifactName, PathBuf), ArtifactError> {
        let base = name.with_disambiguator(None);
        let first = self.next_free.get(&base).copied().unwrap_or(0);

        for n in first..=u64::MAX {
            let name = base.with_disambiguator((n > 0).then_some(n));
            let path = self.dir.join(name.to_string());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    self.next_free.insert(base, n.saturating_add(1));
                    return Ok((file, name, path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ArtifactError::Write { path, source }),
            }
        }
        Err(ArtifactError::NamesExhausted { base: base.base() })
    }
}
