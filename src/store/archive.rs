//! Per-channel dedup archive
//!
//! The archive is the fetch tool's `--download-archive` file. The tool reads
//! it to skip already-fetched items and appends `<extractor> <id>` lines as it
//! downloads. ytcast only shrinks it, during reconciliation.

use super::{StagedFile, append_lines, check_header, read_optional, schema_header};
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const KIND: &str = "archive";

/// Dedup archive for one channel, stored as `<archive_dir>/<slug>.txt`
#[derive(Debug, Clone)]
pub struct DedupArchive {
    path: PathBuf,
    extractor: String,
}

impl DedupArchive {
    /// Open (without touching disk) the archive at `path`
    ///
    /// `extractor` is the prefix the fetch tool uses for its records, e.g.
    /// `youtube`.
    pub fn new(path: impl Into<PathBuf>, extractor: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extractor: extractor.into(),
        }
    }

    /// The archive for `slug` inside `archive_dir`
    pub fn for_channel(archive_dir: &Path, slug: &str, extractor: impl Into<String>) -> Self {
        Self::new(archive_dir.join(format!("{slug}.txt")), extractor)
    }

    /// Archive file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the archive with just its header if it does not exist yet
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        append_lines(&self.path, &schema_header(KIND), "")
    }

    /// All identifiers currently recorded (a missing file is empty)
    pub fn all(&self) -> Result<BTreeSet<String>> {
        let Some(text) = read_optional(&self.path)? else {
            return Ok(BTreeSet::new());
        };
        self.parse(&text)
    }

    /// Whether `id` has been fetched before
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.all()?.contains(id))
    }

    /// Append one identifier in the fetch tool's native record form
    pub fn record(&self, id: &str) -> Result<()> {
        let line = format!("{} {}\n", self.extractor, id.trim());
        append_lines(&self.path, &schema_header(KIND), &line)
    }

    /// Atomically replace the archive with exactly `ids`
    pub fn rewrite<'a, I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.stage(ids)?.commit()
    }

    /// Write the replacement content to a temp file without publishing it
    pub fn stage<'a, I>(&self, ids: I) -> Result<StagedFile>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut staged = StagedFile::new(&self.path)?;
        staged.write_all(self.render(ids).as_bytes())?;
        Ok(staged)
    }

    /// Canonical file content for a set of identifiers: header, then sorted
    /// unique records
    pub fn render<'a, I>(&self, ids: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: BTreeSet<&str> = ids
            .into_iter()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();

        let mut out = schema_header(KIND);
        out.push('\n');
        for id in unique {
            out.push_str(&self.extractor);
            out.push(' ');
            out.push_str(id);
            out.push('\n');
        }
        out
    }

    /// Current raw file content, if the file exists
    pub(crate) fn raw(&self) -> Result<Option<String>> {
        read_optional(&self.path)
    }

    fn parse(&self, text: &str) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        let mut first = true;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
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
            // `<extractor> <id>` or a bare id from older archives
            if let Some(id) = line.split_whitespace().last() {
                ids.insert(id.to_string());
            }
        }

        Ok(ids)
    }
}
