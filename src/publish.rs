//! Feed publishing
//!
//! Every directory under the audio root becomes one RSS 2.0 document in the
//! feeds directory, built purely from the files present on disk. Directories
//! without a matching channel still publish under their folder name.
//!
//! Enclosure URLs start with `http://<placeholder>:<port>`; the server
//! substitutes its own address at startup, so generated feeds do not depend
//! on the machine that serves them.

use crate::channel::ChannelSet;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::write_atomic;
use crate::utils::{audio_mime_type, list_audio_files, list_subdirectories};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the master index inside the feeds directory
pub const INDEX_FILE: &str = "index.json";

/// RFC 2822 in GMT, as podcast clients expect
pub fn rfc2822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// One episode derived from an audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// File name without extension
    pub title: String,
    /// Full enclosure URL (also used as the guid)
    pub url: String,
    /// File modification time
    pub published: DateTime<Utc>,
    /// File size in bytes
    pub length: u64,
    /// MIME type from the extension
    pub mime_type: &'static str,
}

/// Entry of the master index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Channel slug (directory name)
    pub slug: String,
    /// Display name
    pub name: String,
    /// Feed file name
    pub file: String,
    /// Serving path, e.g. `/feeds/<slug>.xml`
    pub url_path: String,
}

/// Master index document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedIndex {
    /// Every generated feed, sorted by slug
    pub feeds: Vec<IndexEntry>,
}

/// Outcome of one publishing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Feed documents written
    pub feeds: usize,
    /// Items across all feeds
    pub items: usize,
    /// Old feed documents removed because their directory is gone
    pub removed: usize,
}

/// Generates feed documents and the index from the audio library
#[derive(Debug, Clone)]
pub struct Publisher {
    base_dir: PathBuf,
    audio_root: PathBuf,
    feeds_dir: PathBuf,
    max_items: usize,
    port: u16,
    title_suffix: String,
    placeholder: String,
}

impl Publisher {
    /// Publisher for the configured layout
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            base_dir: std::path::absolute(&config.paths.base_dir)?,
            audio_root: std::path::absolute(config.paths.audio_root())?,
            feeds_dir: std::path::absolute(config.paths.feeds_root())?,
            max_items: config.publish.max_items,
            port: config.publish.port,
            title_suffix: config.publish.title_suffix.clone(),
            placeholder: config.publish.host_placeholder.clone(),
        })
    }

    /// Host-agnostic base URL, e.g. `http://__HOST__:8000`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.placeholder, self.port)
    }

    /// Publish every channel directory
    pub fn run(&self, channels: &ChannelSet) -> Result<PublishReport> {
        // both must be servable from the base directory
        let feeds_rel = self.relative_to_base(&self.feeds_dir, "paths.feeds_dir")?;
        self.relative_to_base(&self.audio_root, "paths.audio_dir")?;
        std::fs::create_dir_all(&self.feeds_dir)?;

        let mut report = PublishReport::default();
        let mut index = FeedIndex::default();
        let mut written = BTreeSet::new();
        let build_date = Utc::now();

        for dir in list_subdirectories(&self.audio_root)? {
            let Some(slug) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let name = channels
                .by_slug(&slug)
                .map(|c| c.display_name.clone())
                .unwrap_or_else(|| slug.clone());

            let items = match self.collect_items(&dir) {
                Ok(items) => items,
                Err(e) => {
                    warn!(slug = %slug, error = %e, "cannot read channel directory, skipping");
                    continue;
                }
            };

            let file = format!("{slug}.xml");
            let xml = self.render_feed(&name, &items, &build_date)?;
            write_atomic(&self.feeds_dir.join(&file), xml.as_bytes())?;
            debug!(slug = %slug, items = items.len(), "feed written");

            report.feeds += 1;
            report.items += items.len();
            written.insert(file.clone());
            index.feeds.push(IndexEntry {
                url_path: format!("/{}", url_path(&feeds_rel.join(&file))),
                slug,
                name,
                file,
            });
        }

        let mut json = serde_json::to_string_pretty(&index)?;
        json.push('\n');
        write_atomic(&self.feeds_dir.join(INDEX_FILE), json.as_bytes())?;

        report.removed = self.remove_stale(&written)?;
        info!(
            feeds = report.feeds,
            items = report.items,
            removed = report.removed,
            "feeds published"
        );
        Ok(report)
    }

    /// Items for one channel directory, newest first, capped at `max_items`
    pub fn collect_items(&self, dir: &Path) -> Result<Vec<FeedItem>> {
        let base_url = self.base_url();
        let mut items = Vec::new();

        for file in list_audio_files(dir)? {
            let rel = self.relative_to_base(&file.path, "paths.audio_dir")?;
            let title = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.file_name.clone());

            items.push(FeedItem {
                title,
                url: format!("{base_url}/{}", url_path(&rel)),
                published: DateTime::<Utc>::from(file.modified),
                length: file.size,
                mime_type: audio_mime_type(&file.path),
            });
            if self.max_items > 0 && items.len() >= self.max_items {
                break;
            }
        }

        Ok(items)
    }

    /// Render one RSS 2.0 document
    pub fn render_feed(
        &self,
        name: &str,
        items: &[FeedItem],
        build_date: &DateTime<Utc>,
    ) -> Result<String> {
        let rss_items: Vec<rss::Item> = items
            .iter()
            .map(|item| {
                let mut guid = rss::Guid::default();
                guid.set_value(item.url.clone());
                guid.set_permalink(false);

                let mut enclosure = rss::Enclosure::default();
                enclosure.set_url(item.url.clone());
                enclosure.set_length(item.length.to_string());
                enclosure.set_mime_type(item.mime_type);

                let mut rss_item = rss::Item::default();
                rss_item.set_title(item.title.clone());
                rss_item.set_guid(guid);
                rss_item.set_pub_date(rfc2822(&item.published));
                rss_item.set_enclosure(enclosure);
                rss_item
            })
            .collect();

        let mut channel = rss::Channel::default();
        channel.set_title(format!("{name}{}", self.title_suffix));
        channel.set_link(self.base_url());
        channel.set_description(format!("Audio-only feed for {name}"));
        channel.set_last_build_date(rfc2822(build_date));
        channel.set_items(rss_items);

        let bytes = channel
            .write_to(Vec::new())
            .map_err(|e| Error::Other(format!("failed to render feed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| Error::Other(format!("feed is not UTF-8: {e}")))
    }

    fn relative_to_base(&self, path: &Path, key: &str) -> Result<PathBuf> {
        path.strip_prefix(&self.base_dir)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::config(
                    format!(
                        "{} is outside the served directory {}",
                        path.display(),
                        self.base_dir.display()
                    ),
                    key,
                )
            })
    }

    fn remove_stale(&self, written: &BTreeSet<String>) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.feeds_dir)?.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.extension().is_some_and(|ext| ext == "xml")
                && path.is_file()
                && !written.contains(&name)
            {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = ?path, "removed stale feed");
                        removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = ?path, error = %e, "failed to remove stale feed"),
                }
            }
        }
        Ok(removed)
    }
}

/// Percent-encode each path segment and join with `/`
pub(crate) fn url_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(urlencoding::encode(&part.to_string_lossy()).into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
