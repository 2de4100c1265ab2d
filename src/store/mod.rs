//! Durable state files
//!
//! Two kinds of state live on disk:
//!
//! - [`archive::DedupArchive`]: one file per channel listing identifiers the
//!   fetch tool has already downloaded.
//! - [`ledger::Ledger`]: one global, append-oriented file mapping fetched
//!   identifiers to the files they produced.
//!
//! Both start with a versioned schema header (`# ytcast-<kind> v<N>`). Files
//! without a header are read as version 1. Any rewrite goes through
//! [`StagedFile`]: the new content is written to a temporary file in the
//! target's directory, synced, and renamed over the target, so a concurrent
//! reader sees either the old or the new file and never a mix.

pub mod archive;
pub mod ledger;

pub use archive::DedupArchive;
pub use ledger::{Ledger, LedgerEntry};

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Schema version written by this build for every state file
pub const SCHEMA_VERSION: u32 = 1;

const HEADER_PREFIX: &str = "# ytcast-";

/// Header line for a state file of the given kind
pub fn schema_header(kind: &str) -> String {
    format!("{HEADER_PREFIX}{kind} v{SCHEMA_VERSION}")
}

/// Classify a line that might be a schema header
///
/// Returns `Ok(true)` when the line is this build's header for `kind`,
/// `Ok(false)` when the line is not a ytcast header at all (legacy file or a
/// data line), and [`Error::UnsupportedSchema`] for a ytcast header of another
/// kind or version.
pub(crate) fn check_header(path: &Path, kind: &str, line: &str) -> Result<bool> {
    let line = line.trim();
    if !line.starts_with(HEADER_PREFIX) {
        return Ok(false);
    }
    if line == schema_header(kind) {
        return Ok(true);
    }
    Err(Error::UnsupportedSchema {
        path: path.to_path_buf(),
        found: line.to_string(),
    })
}

/// A pending atomic replacement of a file
///
/// Content written to a `StagedFile` is invisible at the target path until
/// [`StagedFile::commit`] succeeds. Dropping a staged file without committing
/// removes the temporary file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Stage a replacement for `target`, creating its parent directory if needed
    pub fn new(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let temp = tempfile::Builder::new()
            .prefix(".ytcast-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| Error::store(&target, format!("failed to create temp file: {e}")))?;

        Ok(Self { temp, target })
    }

    /// Path of the temporary file holding the staged content
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Append bytes to the staged content
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.temp.write_all(bytes)?;
        Ok(())
    }

    /// Flush, fsync and rename the staged content over the target
    pub fn commit(mut self) -> Result<()> {
        self.temp.flush()?;
        self.temp.as_file().sync_all()?;
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| Error::store(&target, format!("atomic rename failed: {}", e.error)))?;
        Ok(())
    }
}

/// Atomically replace `target` with `bytes`
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut staged = StagedFile::new(target)?;
    staged.write_all(bytes)?;
    staged.commit()
}

/// Append already-terminated lines to a state file in one write
///
/// A new or empty file gets `header` first. If a previous writer died
/// mid-line, the torn tail is terminated before appending so the new record
/// does not merge into it.
pub(crate) fn append_lines(path: &Path, header: &str, lines: &str) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?;

    let mut buf = String::new();
    let len = file.metadata()?.len();
    if len == 0 {
        buf.push_str(header);
        buf.push('\n');
    } else {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            buf.push('\n');
        }
    }
    buf.push_str(lines);

    file.write_all(buf.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Read a file to a string, treating a missing file as `None`
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
