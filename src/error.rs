//! Error types for ytcast
//!
//! Every fallible operation in the crate returns [`Result`]. Per-item problems
//! (one channel's feed, one ledger entry, one file that vanished mid-walk) are
//! logged and skipped by the callers; the variants here are what escapes a
//! whole operation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ytcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ytcast
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "channels_file")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error while fetching a channel feed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error (channel config, index.json)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A channel feed document could not be understood
    #[error("feed parse error: {0}")]
    FeedParse(String),

    /// External tool (yt-dlp) could not be located or launched
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// A state file could not be read or written
    #[error("store error at {path}: {reason}")]
    Store {
        /// The state file involved
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A state file carries a schema version this build does not understand
    #[error("unsupported schema in {path}: {found}")]
    UnsupportedSchema {
        /// The state file whose header was rejected
        path: PathBuf,
        /// The header line that was found
        found: String,
    },

    /// Feed server failed to start or crashed
    #[error("server error: {0}")]
    Server(String),

    /// Generic error for cases not covered by specific variants
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Build a store error for the given path
    pub fn store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Store {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should abort the whole command with a non-zero exit
    ///
    /// Network and feed-parse failures are scoped to one channel and are
    /// normally absorbed before they reach the command layer; everything else
    /// means the operation could not do its job.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Network(_) | Error::FeedParse(_))
    }

    /// Machine-readable error code, used in structured log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::FeedParse(_) => "feed_parse_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Store { .. } => "store_error",
            Error::UnsupportedSchema { .. } => "unsupported_schema",
            Error::Server(_) => "server_error",
            Error::Other(_) => "internal_error",
        }
    }
}
