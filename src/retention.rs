//! Retention rotation: cap the number of audio files per channel directory

use crate::config::Config;
use crate::error::Result;
use crate::utils::{list_audio_files, list_subdirectories};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of one rotation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Channel directories examined
    pub directories: usize,
    /// Files deleted (including files that were already gone)
    pub removed: usize,
    /// Files that could not be deleted
    pub failed: usize,
    /// Channel directories that could not be listed
    pub skipped: usize,
}

/// Deletes the oldest audio files beyond a per-channel cap
#[derive(Debug, Clone)]
pub struct Rotator {
    audio_root: PathBuf,
    keep: usize,
}

impl Rotator {
    /// Rotator for the configured audio root and cap
    pub fn new(config: &Config) -> Self {
        Self::with_cap(config.paths.audio_root(), config.retention.keep)
    }

    /// Rotator over an explicit directory; `keep == 0` disables deletion
    pub fn with_cap(audio_root: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            audio_root: audio_root.into(),
            keep,
        }
    }

    /// Rotate every channel directory under the audio root
    ///
    /// Only recognized audio files count toward the cap or are ever deleted.
    /// A missing audio root is treated as an empty library.
    pub fn run(&self) -> Result<RotationReport> {
        if self.keep == 0 {
            debug!("retention disabled (keep = 0)");
            return Ok(RotationReport::default());
        }

        let report = self.rotate_dirs(&list_subdirectories(&self.audio_root)?);
        info!(
            directories = report.directories,
            removed = report.removed,
            failed = report.failed,
            skipped = report.skipped,
            keep = self.keep,
            "rotation complete"
        );
        Ok(report)
    }

    /// Rotate each directory in turn; one directory's error never stops the rest
    pub fn rotate_dirs(&self, dirs: &[PathBuf]) -> RotationReport {
        let mut report = RotationReport::default();
        for dir in dirs {
            report.directories += 1;
            match self.rotate_dir(dir) {
                Ok((removed, failed)) => {
                    report.removed += removed;
                    report.failed += failed;
                }
                Err(e) => {
                    warn!(
                        dir = %dir.display(),
                        error = %e,
                        "cannot rotate channel directory, skipping"
                    );
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Rotate one channel directory, returning (removed, failed)
    pub fn rotate_dir(&self, dir: &Path) -> Result<(usize, usize)> {
        let files = match list_audio_files(dir) {
            Ok(files) => files,
            // directory removed while we were walking the library
            Err(crate::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((0, 0));
            }
            Err(e) => return Err(e),
        };
        if files.len() <= self.keep {
            return Ok((0, 0));
        }

        let mut removed = 0;
        let mut failed = 0;
        for file in &files[self.keep..] {
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!(path = ?file.path, "removed old file");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => removed += 1,
                Err(e) => {
                    warn!(path = ?file.path, error = %e, "failed to remove old file");
                    failed += 1;
                }
            }
        }
        Ok((removed, failed))
    }
}
