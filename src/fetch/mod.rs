//! Fetch orchestration
//!
//! For every enabled channel, in declaration order:
//!
//! 1. fetch and parse the channel feed (failure skips the channel)
//! 2. hand the candidate URLs, the channel's dedup archive and an output
//!    template under `<audio_root>/<slug>/` to the [`FetchTool`]
//! 3. append every file the tool produced to the ledger, with its identifier
//!    when the tool's manifest names it and as a path-only entry otherwise
//!
//! The orchestrator never filters candidates against the archive itself; the
//! tool is the only component that consults it during a fetch.

mod tool;

pub use tool::{FetchRequest, FetchTool, ToolOutcome, YtDlpTool};

use crate::channel::{Channel, ChannelSet};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::FeedClient;
use crate::store::{DedupArchive, Ledger, LedgerEntry};
use crate::utils::{is_audio_file, list_audio_files};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output file name template inside a channel directory
pub const OUTPUT_TEMPLATE: &str = "%(upload_date)s - %(title)s.%(ext)s";

/// Counts from one fetch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Enabled channels considered
    pub channels: usize,
    /// Channels skipped because their feed could not be fetched or was empty,
    /// or their directory or archive could not be prepared
    pub skipped: usize,
    /// Tool invocations that failed to launch or exited non-zero
    pub tool_failures: usize,
    /// Files added to the ledger with a known identifier
    pub identified: usize,
    /// Files added to the ledger without an identifier
    pub path_only: usize,
}

impl FetchSummary {
    /// Newly observed files
    pub fn new_files(&self) -> usize {
        self.identified + self.path_only
    }
}

/// What happened to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Feed unreachable, unparseable or empty
    Skipped,
    /// The tool ran and produced these new files
    Fetched {
        /// Whether the tool launched and exited zero
        tool_ok: bool,
        /// Ledger entries for the new files
        entries: Vec<LedgerEntry>,
    },
}

/// Drives the fetch tool across all channels
pub struct FetchOrchestrator {
    feeds: FeedClient,
    tool: Arc<dyn FetchTool>,
    audio_root: PathBuf,
    archive_dir: PathBuf,
    ledger: Ledger,
    max_candidates: usize,
    extractor: String,
}

impl FetchOrchestrator {
    /// Create an orchestrator for the configured layout
    ///
    /// Relative paths are resolved against the current directory so ledger
    /// entries are always absolute.
    pub fn new(config: &Config, tool: Arc<dyn FetchTool>) -> Result<Self> {
        Ok(Self {
            feeds: FeedClient::new(&config.fetch)?,
            tool,
            audio_root: std::path::absolute(config.paths.audio_root())?,
            archive_dir: std::path::absolute(&config.paths.archive_dir)?,
            ledger: Ledger::new(std::path::absolute(&config.paths.ledger_path)?),
            max_candidates: config.fetch.max_candidates,
            extractor: config.fetch.archive_extractor.clone(),
        })
    }

    /// Fetch every enabled channel
    ///
    /// Per-channel feed, tool and filesystem failures are logged and counted.
    /// Only failures to prepare the shared directories or to write the ledger
    /// abort the pass.
    pub async fn run(&self, channels: &ChannelSet) -> Result<FetchSummary> {
        std::fs::create_dir_all(&self.audio_root).map_err(|e| {
            Error::config(
                format!("cannot create audio dir {}: {e}", self.audio_root.display()),
                "paths.audio_dir",
            )
        })?;
        std::fs::create_dir_all(&self.archive_dir).map_err(|e| {
            Error::config(
                format!("cannot create archive dir {}: {e}", self.archive_dir.display()),
                "paths.archive_dir",
            )
        })?;

        let mut summary = FetchSummary::default();
        for channel in channels.enabled() {
            summary.channels += 1;
            match self.fetch_channel(channel).await {
                Ok(ChannelOutcome::Skipped) => summary.skipped += 1,
                Ok(ChannelOutcome::Fetched { tool_ok, entries }) => {
                    self.ledger.append_all(&entries)?;
                    if !tool_ok {
                        summary.tool_failures += 1;
                    }
                    for entry in &entries {
                        match entry {
                            LedgerEntry::Identified { .. } => summary.identified += 1,
                            LedgerEntry::PathOnly { .. } => summary.path_only += 1,
                        }
                    }
                }
                Err(e) => {
                    warn!(slug = %channel.slug, error = %e, "channel failed, skipping");
                    summary.skipped += 1;
                }
            }
        }

        info!(
            channels = summary.channels,
            skipped = summary.skipped,
            tool_failures = summary.tool_failures,
            new_files = summary.new_files(),
            "fetch pass complete"
        );
        Ok(summary)
    }

    /// Fetch one channel
    ///
    /// The returned entries are not yet in the ledger; [`run`](Self::run)
    /// appends them. An error here concerns this channel only.
    pub async fn fetch_channel(&self, channel: &Channel) -> Result<ChannelOutcome> {
        let slug = channel.slug.as_str();
        info!(slug, name = %channel.display_name, "fetching channel");

        let items = match self
            .feeds
            .fetch_items(&channel.url, self.max_candidates)
            .await
        {
            Ok(items) if items.is_empty() => {
                info!(slug, "feed has no items, skipping");
                return Ok(ChannelOutcome::Skipped);
            }
            Ok(items) => items,
            Err(e) => {
                warn!(slug, url = %channel.url, error = %e, "channel feed unavailable, skipping");
                return Ok(ChannelOutcome::Skipped);
            }
        };

        let mut seen = HashSet::new();
        let urls: Vec<String> = items
            .into_iter()
            .map(|item| item.url)
            .filter(|url| seen.insert(url.clone()))
            .collect();
        debug!(slug, candidates = urls.len(), "resolved candidate urls");

        let channel_dir = self.audio_root.join(slug);
        std::fs::create_dir_all(&channel_dir)?;
        let archive = DedupArchive::for_channel(&self.archive_dir, slug, self.extractor.clone());
        archive.ensure_exists()?;

        let manifest = tempfile::Builder::new()
            .prefix(".ytcast-manifest-")
            .suffix(".tsv")
            .tempfile_in(&self.archive_dir)?;

        let before = snapshot(&channel_dir)?;
        let request = FetchRequest {
            slug: slug.to_string(),
            archive: archive.path().to_path_buf(),
            output_template: channel_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
            manifest: manifest.path().to_path_buf(),
            urls,
        };

        let tool_ok = match self.tool.fetch(&request).await {
            Ok(outcome) if outcome.success() => true,
            Ok(outcome) => {
                warn!(
                    slug,
                    tool = self.tool.name(),
                    exit_code = ?outcome.exit_code,
                    "fetch tool exited with failure, keeping partial results"
                );
                false
            }
            Err(e) => {
                warn!(slug, tool = self.tool.name(), error = %e, "fetch tool failed to run");
                false
            }
        };

        let after = snapshot(&channel_dir)?;
        let manifest_text = match std::fs::read_to_string(manifest.path()) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    slug,
                    path = %manifest.path().display(),
                    error = %e,
                    "manifest unreadable, recording new files without identifiers"
                );
                String::new()
            }
        };
        let entries = collect_entries(&channel_dir, &before, &after, &manifest_text);

        info!(
            slug,
            new_files = entries.len(),
            identified = entries.iter().filter(|e| e.id().is_some()).count(),
            "channel fetched"
        );
        Ok(ChannelOutcome::Fetched { tool_ok, entries })
    }
}

/// Audio files currently in a channel directory
fn snapshot(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    Ok(list_audio_files(dir)?
        .into_iter()
        .map(|file| file.path)
        .collect())
}

/// Build ledger entries for files that appeared during a tool run
///
/// Manifest lines (`id<TAB>path`) supply identifiers. A manifest path that
/// was already present before the run, is not a recognized audio file, no
/// longer exists or lies outside the channel directory is ignored. New files
/// with no manifest line become path-only entries, sorted by path.
fn collect_entries(
    channel_dir: &Path,
    before: &BTreeSet<PathBuf>,
    after: &BTreeSet<PathBuf>,
    manifest: &str,
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    let mut covered = HashSet::new();

    for line in manifest.lines() {
        let Some((id, raw_path)) = line.split_once('\t') else {
            continue;
        };
        let path = channel_dir.join(raw_path.trim_end_matches('\r'));
        if before.contains(&path)
            || !path.starts_with(channel_dir)
            || !is_audio_file(&path)
            || !path.is_file()
        {
            debug!(path = %path.display(), "ignoring manifest line");
            continue;
        }
        if covered.insert(path.clone()) {
            entries.push(LedgerEntry::new(Some(id), path));
        }
    }

    for path in after.difference(before) {
        if !covered.contains(path) {
            entries.push(LedgerEntry::new(None, path.clone()));
        }
    }

    entries
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
