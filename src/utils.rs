//! Utility functions for audio file recognition and directory listing

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Audio extensions the library recognizes (lowercase, without the dot)
pub const AUDIO_EXTENSIONS: &[&str] = &["opus", "mp3", "m4a", "aac", "ogg", "wav"];

/// MIME type used when an extension is not in the lookup table
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Check whether a path has a recognized audio extension (case-insensitive)
///
/// # Examples
///
/// ```
/// use ytcast::utils::is_audio_file;
/// use std::path::Path;
///
/// assert!(is_audio_file(Path::new("20240101 - Episode.OPUS")));
/// assert!(!is_audio_file(Path::new("cover.jpg")));
/// ```
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Best-effort MIME type for an audio file, based on its extension
pub fn audio_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        _ => DEFAULT_AUDIO_MIME,
    }
}

/// A recognized audio file observed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    /// Absolute or caller-relative path to the file
    pub path: PathBuf,
    /// File name component, used as the ordering tiebreak
    pub file_name: String,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub size: u64,
}

/// List recognized audio files directly inside `dir`, newest first
///
/// Entries that vanish between the directory read and the metadata call are
/// skipped. Files with equal modification times are ordered by file name so
/// the result is deterministic.
pub fn list_audio_files(dir: &Path) -> Result<Vec<AudioFile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !is_audio_file(&path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file disappeared during listing");
                continue;
            }
        };

        files.push(AudioFile {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            modified: metadata.modified()?,
            size: metadata.len(),
            path,
        });
    }

    sort_newest_first(&mut files);
    Ok(files)
}

/// Sort by modification time descending, then by file name
pub fn sort_newest_first(files: &mut [AudioFile]) {
    files.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

/// List immediate subdirectories of `dir`, sorted by name
///
/// A missing `dir` yields an empty list.
pub fn list_subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}
