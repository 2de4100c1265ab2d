//! Channel configuration
//!
//! The channel document is JSON of the form
//! `{"channels": [{"name": ..., "url": ..., "enabled": true, "slug": ...}]}`.
//! Each channel's slug is the join key between the document, the
//! `<audio_root>/<slug>/` directory, the `<slug>.txt` archive and the
//! `<slug>.xml` feed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

/// Slug used when a name normalizes to nothing
pub const DEFAULT_SLUG: &str = "channel";

/// Normalize a display name into a filesystem- and URL-safe identifier
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single hyphen and strips leading/trailing hyphens. An empty result becomes
/// [`DEFAULT_SLUG`].
///
/// # Examples
///
/// ```
/// use ytcast::channel::slugify;
///
/// assert_eq!(slugify("Test Channel"), "test-channel");
/// assert_eq!(slugify("  Rust -- & C++!  "), "rust-c");
/// assert_eq!(slugify("!!!"), "channel");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

/// A configured source channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Remote channel feed URL
    pub url: String,
    /// Human-readable name used in published feeds
    pub display_name: String,
    /// Normalized identifier (see [`slugify`])
    pub slug: String,
    /// Disabled channels are neither fetched nor exported
    pub enabled: bool,
}

/// Raw channel entry as written in the channel document
#[derive(Clone, Debug, Default, Deserialize)]
struct ChannelEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelDocument {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
}

/// Per-URL export record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Display name
    pub name: String,
    /// Whether the channel is enabled
    pub enabled: bool,
    /// Channel slug
    pub slug: String,
}

/// `by_url` export document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    /// Channels keyed by feed URL
    pub by_url: BTreeMap<String, ChannelSummary>,
}

/// The validated list of channels, in declaration order
#[derive(Clone, Debug, Default)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    /// Load and validate the channel document at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read channel file {}: {e}", path.display()),
            key: Some("channels_file".into()),
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a channel document
    ///
    /// Entries without a URL are skipped with a warning. Two enabled channels
    /// that share a slug are a configuration error.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: ChannelDocument = serde_json::from_str(text)?;
        let mut channels = Vec::with_capacity(doc.channels.len());

        for (index, entry) in doc.channels.into_iter().enumerate() {
            let url = entry.url.as_deref().map(str::trim).unwrap_or_default();
            if url.is_empty() {
                warn!(index, name = ?entry.name, "channel has no url, skipping");
                continue;
            }

            let display_name = entry
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(url)
                .to_string();

            let slug = match entry.slug.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => slugify(s),
                _ => slugify(&display_name),
            };

            channels.push(Channel {
                url: url.to_string(),
                display_name,
                slug,
                enabled: entry.enabled.unwrap_or(true),
            });
        }

        Self::from_channels(channels)
    }

    /// Build a set from already-constructed channels, with the same slug
    /// validation as a parsed document
    pub fn from_channels(channels: Vec<Channel>) -> Result<Self> {
        let set = Self { channels };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for channel in self.enabled() {
            if let Some(other) = seen.insert(&channel.slug, &channel.display_name) {
                return Err(Error::config(
                    format!(
                        "channels '{}' and '{}' both map to slug '{}'",
                        other, channel.display_name, channel.slug
                    ),
                    "channels",
                ));
            }
        }
        Ok(())
    }

    /// Every configured channel, including disabled ones
    pub fn all(&self) -> &[Channel] {
        &self.channels
    }

    /// Enabled channels in declaration order
    pub fn enabled(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.enabled)
    }

    /// Look up a channel by slug, preferring enabled channels
    pub fn by_slug(&self, slug: &str) -> Option<&Channel> {
        self.enabled()
            .find(|c| c.slug == slug)
            .or_else(|| self.channels.iter().find(|c| c.slug == slug))
    }

    /// Enabled channel URLs, one per line
    pub fn url_list(&self) -> String {
        self.enabled().fold(String::new(), |mut out, c| {
            out.push_str(&c.url);
            out.push('\n');
            out
        })
    }

    /// Every channel keyed by URL
    pub fn by_url(&self) -> ChannelMap {
        let by_url = self
            .channels
            .iter()
            .map(|c| {
                (
                    c.url.clone(),
                    ChannelSummary {
                        name: c.display_name.clone(),
                        enabled: c.enabled,
                        slug: c.slug.clone(),
                    },
                )
            })
            .collect();
        ChannelMap { by_url }
    }
}
