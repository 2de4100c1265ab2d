//! Global state ledger
//!
//! One `identifier<TAB>absolute_path` record per line after the schema
//! header. Path-only entries keep an empty identifier field on disk but are a
//! distinct [`LedgerEntry`] variant in memory.

use super::{StagedFile, append_lines, check_header, read_optional, schema_header};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const KIND: &str = "ledger";

/// One fetched file recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// The fetch tool reported which item produced this file
    Identified {
        /// Remote item identifier
        id: String,
        /// Absolute path of the produced file
        path: PathBuf,
    },
    /// The file was observed on disk but could not be tied to an identifier
    PathOnly {
        /// Absolute path of the produced file
        path: PathBuf,
    },
}

impl LedgerEntry {
    /// Build an entry, treating a blank identifier as path-only
    pub fn new(id: Option<&str>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => LedgerEntry::Identified {
                id: id.to_string(),
                path,
            },
            None => LedgerEntry::PathOnly { path },
        }
    }

    /// File this entry points at
    pub fn path(&self) -> &Path {
        match self {
            LedgerEntry::Identified { path, .. } | LedgerEntry::PathOnly { path } => path,
        }
    }

    /// Identifier, when known
    pub fn id(&self) -> Option<&str> {
        match self {
            LedgerEntry::Identified { id, .. } => Some(id),
            LedgerEntry::PathOnly { .. } => None,
        }
    }

    fn to_line(&self) -> String {
        format!("{}\t{}\n", self.id().unwrap_or(""), self.path().display())
    }

    fn parse_line(line: &str) -> Option<Self> {
        let (id, path) = line.split_once('\t')?;
        let path = path.trim_end_matches('\r');
        if path.trim().is_empty() || path.contains('\t') {
            return None;
        }
        Some(Self::new(Some(id), path))
    }
}

/// Append-oriented ledger file
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Ledger stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.append_all(std::slice::from_ref(entry))
    }

    /// Append several records in a single write
    pub fn append_all(&self, entries: &[LedgerEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut lines = String::new();
        for entry in entries {
            lines.push_str(&self.checked_line(entry)?);
        }
        append_lines(&self.path, &schema_header(KIND), &lines)
    }

    /// All records in file order; a missing ledger is empty
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.read_if_exists()?.unwrap_or_default())
    }

    /// All records, or `None` when the ledger file does not exist
    pub fn read_if_exists(&self) -> Result<Option<Vec<LedgerEntry>>> {
        let Some(text) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        let mut first = true;
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if first {
                first = false;
                if check_header(&self.path, KIND, line)? {
                    continue;
                }
            }
            if line.starts_with('#') {
                continue;
            }
            match LedgerEntry::parse_line(line) {
                Some(entry) => entries.push(entry),
                None => debug!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    "skipping malformed ledger line"
                ),
            }
        }
        Ok(Some(entries))
    }

    /// Atomically replace the ledger with exactly `entries`, in order
    pub fn rewrite(&self, entries: &[LedgerEntry]) -> Result<()> {
        let mut staged = StagedFile::new(&self.path)?;
        staged.write_all(self.render(entries)?.as_bytes())?;
        staged.commit()
    }

    /// Canonical file content for `entries`
    pub fn render(&self, entries: &[LedgerEntry]) -> Result<String> {
        let mut out = schema_header(KIND);
        out.push('\n');
        for entry in entries {
            out.push_str(&self.checked_line(entry)?);
        }
        Ok(out)
    }

    fn checked_line(&self, entry: &LedgerEntry) -> Result<String> {
        let line = entry.to_line();
        // one record per line, exactly one separator
        if line.matches('\t').count() != 1 || line.matches('\n').count() != 1 {
            return Err(Error::store(
                &self.path,
                format!(
                    "entry for {} cannot be stored as a single record",
                    entry.path().display()
                ),
            ));
        }
        Ok(line)
    }
}
