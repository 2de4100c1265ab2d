//! Configuration types for ytcast
//!
//! Every field has a serde default, so `{}` is a valid configuration file and
//! CLI flags only need to override what differs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Filesystem layout
///
/// ```text
/// <base_dir>/
///   audio/<slug>/<upload_date> - <title>.<ext>
///   feeds/<slug>.xml
///   feeds/index.json
/// <archive_dir>/<slug>.txt
/// <ledger_path>
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Channel document (default: "channels.json")
    #[serde(default = "default_channels_file")]
    pub channels_file: PathBuf,

    /// Directory served over HTTP (default: "library")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Audio library root (default: `<base_dir>/audio`)
    #[serde(default)]
    pub audio_dir: Option<PathBuf>,

    /// Generated feeds (default: `<base_dir>/feeds`)
    #[serde(default)]
    pub feeds_dir: Option<PathBuf>,

    /// Per-channel dedup archives (default: "state/archive")
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Global ledger file (default: "state/ledger.tsv")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            channels_file: default_channels_file(),
            base_dir: default_base_dir(),
            audio_dir: None,
            feeds_dir: None,
            archive_dir: default_archive_dir(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl PathsConfig {
    /// Audio library root
    pub fn audio_root(&self) -> PathBuf {
        self.audio_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("audio"))
    }

    /// Directory holding generated feed documents
    pub fn feeds_root(&self) -> PathBuf {
        self.feeds_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("feeds"))
    }
}

/// External fetch tool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Path to yt-dlp (None = search PATH)
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Target audio format (default: "opus")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Target audio quality (default: "64K")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Only pass the newest N feed items to the tool (0 = all)
    #[serde(default)]
    pub max_candidates: usize,

    /// Timeout for the channel feed request (default: 20 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent sent with feed requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Value for the tool's `--extractor-args` (None = omit)
    #[serde(default = "default_extractor_args")]
    pub extractor_args: Option<String>,

    /// Extra arguments appended verbatim before the URLs
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Extractor prefix used in archive records (default: "youtube")
    #[serde(default = "default_archive_extractor")]
    pub archive_extractor: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
            max_candidates: 0,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            extractor_args: default_extractor_args(),
            extra_args: Vec::new(),
            archive_extractor: default_archive_extractor(),
        }
    }
}

/// Retention settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Files kept per channel directory (default: 60, 0 = keep everything)
    #[serde(default = "default_keep")]
    pub keep: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
        }
    }
}

/// Feed generation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Items per feed (default: 200)
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Port baked into enclosure URLs; must equal `server.port` (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Appended to the channel name in the feed title
    #[serde(default = "default_title_suffix")]
    pub title_suffix: String,

    /// Token the server replaces with the detected host address
    #[serde(default = "default_host_placeholder")]
    pub host_placeholder: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            port: default_port(),
            title_suffix: default_title_suffix(),
            host_placeholder: default_host_placeholder(),
        }
    }
}

/// Feed server settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port on all interfaces (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address used to discover the outbound interface (never sent data)
    #[serde(default = "default_probe_address")]
    pub probe_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            probe_address: default_probe_address(),
        }
    }
}

/// Periodic runner settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// How often channels are fetched (default: 6 hours)
    #[serde(default = "default_fetch_interval", with = "duration_serde")]
    pub fetch_interval: Duration,

    /// How often rotate/prune/publish run (default: 1 hour)
    ///
    /// This bounds how long a deleted file can remain listed in the ledger
    /// and archives.
    #[serde(default = "default_reconcile_interval", with = "duration_serde")]
    pub reconcile_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fetch_interval: default_fetch_interval(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Fetch tool and feed request settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retention cap
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Feed generation
    #[serde(default)]
    pub publish: PublishConfig,

    /// Feed server
    #[serde(default)]
    pub server: ServerConfig,

    /// Scheduler intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config file {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.schedule.fetch_interval.is_zero() {
            return Err(Error::config(
                "fetch_interval must be greater than zero",
                "schedule.fetch_interval",
            ));
        }
        if self.schedule.reconcile_interval.is_zero() {
            return Err(Error::config(
                "reconcile_interval must be greater than zero",
                "schedule.reconcile_interval",
            ));
        }
        if self.publish.host_placeholder.is_empty() {
            return Err(Error::config(
                "host_placeholder must not be empty",
                "publish.host_placeholder",
            ));
        }
        if self.publish.port != self.server.port {
            return Err(Error::config(
                format!(
                    "publish.port ({}) must match server.port ({}) or served feeds keep the host placeholder",
                    self.publish.port, self.server.port
                ),
                "publish.port",
            ));
        }
        if self.fetch.archive_extractor.split_whitespace().count() != 1 {
            return Err(Error::config(
                "archive_extractor must be a single word",
                "fetch.archive_extractor",
            ));
        }
        Ok(())
    }
}

fn default_channels_file() -> PathBuf {
    PathBuf::from("channels.json")
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("library")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("state/archive")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("state/ledger.tsv")
}

fn default_audio_format() -> String {
    "opus".to_string()
}

fn default_audio_quality() -> String {
    "64K".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) ytcast/1.0".to_string()
}

fn default_extractor_args() -> Option<String> {
    Some("youtube:player_client=android,ios".to_string())
}

fn default_archive_extractor() -> String {
    "youtube".to_string()
}

fn default_keep() -> usize {
    60
}

fn default_max_items() -> usize {
    200
}

fn default_port() -> u16 {
    8000
}

fn default_title_suffix() -> String {
    " (YouTube Audio)".to_string()
}

fn default_host_placeholder() -> String {
    "__HOST__".to_string()
}

fn default_probe_address() -> SocketAddr {
    SocketAddr::from(([1, 1, 1, 1], 80))
}

fn default_fetch_interval() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.audio_format, "opus");
        assert_eq!(config.fetch.audio_quality, "64K");
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(20));
        assert_eq!(config.retention.keep, 60);
        assert_eq!(config.publish.max_items, 200);
        assert_eq!(config.publish.host_placeholder, "__HOST__");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.schedule.reconcile_interval, Duration::from_secs(3600));
        assert_eq!(config.paths.audio_root(), PathBuf::from("library/audio"));
        assert_eq!(config.paths.feeds_root(), PathBuf::from("library/feeds"));
        config.validate().unwrap();
    }

    #[test]
    fn explicit_dirs_override_base_dir() {
        let config: Config = serde_json::from_str(
            r#"{"paths": {"base_dir": "/srv/pod", "audio_dir": "/mnt/audio"}}"#,
        )
        .unwrap();
        assert_eq!(config.paths.audio_root(), PathBuf::from("/mnt/audio"));
        assert_eq!(config.paths.feeds_root(), PathBuf::from("/srv/pod/feeds"));
    }

    #[test]
    fn durations_are_seconds() {
        let config: Config = serde_json::from_str(
            r#"{"schedule": {"fetch_interval": 600, "reconcile_interval": 60}}"#,
        )
        .unwrap();
        assert_eq!(config.schedule.fetch_interval, Duration::from_secs(600));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["schedule"]["reconcile_interval"], 60);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"schedule": {"fetch_interval": 0}}"#).unwrap();

        match Config::from_file(&path).unwrap_err() {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("schedule.fetch_interval"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_ports_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 9000}}"#).unwrap();

        match Config::from_file(&path).unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("publish.port")),
            other => panic!("unexpected error: {other:?}"),
        }

        std::fs::write(&path, r#"{"server": {"port": 9000}, "publish": {"port": 9000}}"#)
            .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn extractor_args_can_be_disabled() {
        let config: Config =
            serde_json::from_str(r#"{"fetch": {"extractor_args": null}}"#).unwrap();
        assert!(config.fetch.extractor_args.is_none());
    }
}
