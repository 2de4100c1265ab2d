//! External fetch tool abstraction and the yt-dlp implementation

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// One batch handed to the fetch tool for a single channel
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Channel slug, for logging
    pub slug: String,
    /// Dedup archive the tool consults and appends to
    pub archive: PathBuf,
    /// Output path template rooted at `<audio_root>/<slug>/`
    pub output_template: String,
    /// File the tool appends `id<TAB>filepath` lines to after each download
    pub manifest: PathBuf,
    /// Candidate item URLs, newest first
    pub urls: Vec<String>,
}

/// Result of one tool invocation
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Process exit code (`None` when killed by a signal)
    pub exit_code: Option<i32>,
}

impl ToolOutcome {
    /// Whether every item succeeded
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Media fetch/transcode collaborator
///
/// Implementations must skip items already listed in the archive, download
/// the rest into the output template, append every newly fetched identifier
/// to the archive and write one `id<TAB>path` line per produced file to the
/// manifest. A non-zero exit may still have produced some files.
#[async_trait]
pub trait FetchTool: Send + Sync {
    /// Run one batch for one channel
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutcome>;

    /// Short tool name for logging
    fn name(&self) -> &'static str;
}

/// yt-dlp invoked as a subprocess
///
/// # Examples
///
/// ```no_run
/// use ytcast::config::FetchConfig;
/// use ytcast::fetch::YtDlpTool;
///
/// // Uses `tool_path` from the config, or searches PATH for yt-dlp
/// let tool = YtDlpTool::from_config(&FetchConfig::default())
///     .expect("yt-dlp not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpTool {
    binary_path: PathBuf,
    audio_format: String,
    audio_quality: String,
    extractor_args: Option<String>,
    extra_args: Vec<String>,
}

impl YtDlpTool {
    /// Create a tool with an explicit binary path
    pub fn new(binary_path: PathBuf, config: &FetchConfig) -> Self {
        Self {
            binary_path,
            audio_format: config.audio_format.clone(),
            audio_quality: config.audio_quality.clone(),
            extractor_args: config.extractor_args.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Use `config.tool_path`, or find `yt-dlp` in PATH
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let binary_path = match &config.tool_path {
            Some(path) => path.clone(),
            None => which::which("yt-dlp").map_err(|e| {
                Error::ExternalTool(format!("yt-dlp not found in PATH: {}", e))
            })?,
        };
        Ok(Self::new(binary_path, config))
    }

    /// Binary that will be executed
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Full argument list for a request
    pub fn args(&self, request: &FetchRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--no-progress",
            "--yes-playlist",
            "--ignore-errors",
            "--download-archive",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(request.archive.clone().into_os_string());

        if let Some(extractor_args) = &self.extractor_args {
            args.push("--extractor-args".into());
            args.push(extractor_args.into());
        }

        for arg in [
            "-f",
            "bestaudio",
            "--extract-audio",
            "--audio-format",
            self.audio_format.as_str(),
            "--audio-quality",
            self.audio_quality.as_str(),
            "--embed-metadata",
            "--add-metadata",
            "--print-to-file",
            "after_move:%(id)s\t%(filepath)s",
        ] {
            args.push(arg.into());
        }
        args.push(request.manifest.clone().into_os_string());

        args.push("-o".into());
        args.push(request.output_template.clone().into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("--".into());
        args.extend(request.urls.iter().map(OsString::from));
        args
    }
}

#[async_trait]
impl FetchTool for YtDlpTool {
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutcome> {
        // output is streamed to the terminal like an interactive run
        let status = Command::new(&self.binary_path)
            .args(self.args(request))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        Ok(ToolOutcome {
            exit_code: status.code(),
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
