//! Reset-to-remote: delete local files the remote manifest does not list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use hashsync_core::Manifest;

/// A file that could not be deleted during a reset.
#[derive(Debug, Error)]
#[error("Failed to delete {path}: {source}")]
pub struct DeletionError {
    /// Absolute path of the file.
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Outcome of a reset.
#[derive(Debug, Default)]
pub struct ResetReport {
    /// Keys of files that were removed.
    pub removed: Vec<String>,
    /// Files that could not be removed.
    pub failures: Vec<DeletionError>,
}

impl ResetReport {
    /// Whether every stale file was removed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Keys present locally but not remotely, in sorted order.
pub fn stale_paths<'a>(local: &'a Manifest, remote: &Manifest) -> Vec<&'a str> {
    local.keys().filter(|key| !remote.contains(key)).collect()
}

/// Deletes local files that are not part of the remote state.
///
/// Destructive and irreversible; only run it when the caller asked for
/// reset semantics. The local manifest should come from a full scan, since
/// files it does not list are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResetCoordinator;

impl ResetCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self
    }

    /// Delete every file in `local` that `remote` does not list.
    ///
    /// Failures are collected; the remaining files are still attempted.
    pub fn reset(&self, local: &Manifest, remote: &Manifest, root: &Path) -> ResetReport {
        let stale = stale_paths(local, remote);
        debug!("Removing {stale:?}");

        let mut report = ResetReport::default();
        for key in stale {
            let path = root.join(key);
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(key.to_string()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{key} already gone");
                    report.removed.push(key.to_string());
                }
                Err(source) => {
                    warn!("Failed to delete {}: {source}", path.display());
                    report.failures.push(DeletionError { path, source });
                }
            }
        }

        info!(
            "{} files were reset to state of remote repository",
            report.removed.len()
        );
        report
    }
}
