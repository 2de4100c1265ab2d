//! Ledger and archive reconciliation
//!
//! Files disappear outside ytcast's control (retention, manual cleanup). The
//! reconciler drops every ledger entry whose file is gone and rebuilds each
//! channel's dedup archive from the surviving identified entries, so an item
//! whose file was deleted becomes eligible for fetching again.
//!
//! The owning channel of a ledger entry comes from the fixed layout
//! `<audio_root>/<slug>/<file>`. Entries that do not follow it stay in the
//! ledger (their file still exists) but feed no archive.

use crate::config::Config;
use crate::error::Result;
use crate::store::{DedupArchive, Ledger, LedgerEntry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Channel a ledger entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Owner {
    /// Entry lives under `<audio_root>/<slug>/`
    Channel(String),
    /// Layout could not be matched
    Unknown,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// No ledger file existed; nothing was touched
    pub ledger_missing: bool,
    /// Ledger entries whose file still exists
    pub kept: usize,
    /// Ledger entries removed because their file is gone
    pub dropped: usize,
    /// Kept entries whose channel could not be inferred
    pub unknown_owner: usize,
    /// Whether the ledger file was replaced
    pub ledger_rewritten: bool,
    /// Archives replaced with new content
    pub archives_rewritten: usize,
    /// Archives already matching the ledger
    pub archives_unchanged: usize,
}

/// Prunes the ledger and rebuilds archives from it
#[derive(Debug, Clone)]
pub struct Reconciler {
    ledger: Ledger,
    archive_dir: PathBuf,
    audio_root: PathBuf,
    extractor: String,
}

impl Reconciler {
    /// Reconciler for the configured layout
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_paths(
            config.paths.ledger_path.clone(),
            config.paths.archive_dir.clone(),
            std::path::absolute(config.paths.audio_root())?,
            config.fetch.archive_extractor.clone(),
        ))
    }

    /// Reconciler over explicit paths
    pub fn from_paths(
        ledger_path: PathBuf,
        archive_dir: PathBuf,
        audio_root: PathBuf,
        extractor: String,
    ) -> Self {
        Self {
            ledger: Ledger::new(ledger_path),
            archive_dir,
            audio_root,
            extractor,
        }
    }

    /// Infer which channel owns `path`
    ///
    /// Paths under the audio root use the first component below it. Other
    /// absolute paths (for example a library that was moved or mounted
    /// elsewhere) fall back to the component that follows the last directory
    /// named like the audio root. Either way a file name must follow the slug.
    pub fn owner_of(&self, path: &Path) -> Owner {
        if let Ok(rel) = path.strip_prefix(&self.audio_root) {
            return slug_from_tail(rel.components());
        }

        let Some(marker) = self.audio_root.file_name() else {
            return Owner::Unknown;
        };
        let components: Vec<Component<'_>> = path.components().collect();
        match components
            .iter()
            .rposition(|c| matches!(c, Component::Normal(name) if *name == marker))
        {
            Some(pos) => slug_from_tail(components[pos + 1..].iter().copied()),
            None => Owner::Unknown,
        }
    }

    /// Run one pass
    pub fn run(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let Some(current) = self.ledger.read_if_exists()? else {
            info!(ledger = %self.ledger.path().display(), "no ledger yet, nothing to reconcile");
            report.ledger_missing = true;
            return Ok(report);
        };

        let mut kept = Vec::with_capacity(current.len());
        for entry in current {
            // vanished or unreadable both count as gone
            if entry.path().is_file() {
                kept.push(entry);
            } else {
                debug!(path = %entry.path().display(), id = ?entry.id(), "dropping ledger entry");
                report.dropped += 1;
            }
        }
        report.kept = kept.len();

        let mut ids_by_slug: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for entry in &kept {
            match self.owner_of(entry.path()) {
                Owner::Channel(slug) => {
                    let ids = ids_by_slug.entry(slug).or_default();
                    if let LedgerEntry::Identified { id, .. } = entry {
                        ids.insert(id);
                    }
                }
                Owner::Unknown => {
                    debug!(path = %entry.path().display(), "cannot infer channel for ledger entry");
                    report.unknown_owner += 1;
                }
            }
        }

        let rendered = self.ledger.render(&kept)?;
        if std::fs::read_to_string(self.ledger.path()).ok().as_deref() != Some(rendered.as_str()) {
            self.ledger.rewrite(&kept)?;
            report.ledger_rewritten = true;
        }

        for archive in self.archives()? {
            let slug = archive_slug(archive.path());
            let ids = ids_by_slug.get(slug.as_str()).cloned().unwrap_or_default();
            let rendered = archive.render(ids.iter().copied());
            if archive.raw()?.as_deref() == Some(rendered.as_str()) {
                report.archives_unchanged += 1;
                continue;
            }
            // surfaces UnsupportedSchema before replacing a file we don't understand
            archive.all()?;
            archive.rewrite(ids.iter().copied())?;
            debug!(slug = %slug, ids = ids.len(), "archive rewritten");
            report.archives_rewritten += 1;
        }

        info!(
            kept = report.kept,
            dropped = report.dropped,
            unknown_owner = report.unknown_owner,
            archives_rewritten = report.archives_rewritten,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Every `<slug>.txt` archive in the archive directory, sorted by name
    fn archives(&self) -> Result<Vec<DedupArchive>> {
        let entries = match std::fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == "txt")
                    && !archive_slug(path).starts_with('.')
            })
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| DedupArchive::new(path, self.extractor.clone()))
            .collect())
    }
}

fn archive_slug(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn slug_from_tail<'a>(mut tail: impl Iterator<Item = Component<'a>>) -> Owner {
    match (tail.next(), tail.next()) {
        (Some(Component::Normal(slug)), Some(Component::Normal(_))) => {
            Owner::Channel(slug.to_string_lossy().into_owned())
        }
        _ => Owner::Unknown,
    }
}
