//! Manifest generation from a directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use hashsync_core::{
    ExclusionSet, Manifest, ManifestEntry, ScanError, ScanWarning, WarningKind, path_to_key,
};

use crate::hasher::Hasher;
use crate::progress::ScanProgress;

/// Which local files a scan hashes.
#[derive(Debug, Clone, Copy)]
pub enum ScanScope<'a> {
    /// Every file under the root.
    Full,
    /// Only the paths listed in a remote manifest. Missing files are
    /// omitted from the result rather than reported.
    RemoteSubset(&'a Manifest),
}

/// Result of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Generated manifest.
    pub manifest: Manifest,
    /// Files that could not be hashed and were left out.
    pub warnings: Vec<ScanWarning>,
    /// Wall time of the scan.
    pub duration: Duration,
}

/// Hashes a directory tree into a [`Manifest`].
///
/// Directory listing uses jwalk; hashing of independent files runs on the
/// rayon pool.
pub struct TreeScanner {
    hasher: Hasher,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl TreeScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self::with_hasher(Hasher::new())
    }

    /// Create a scanner using a specific hasher.
    pub fn with_hasher(hasher: Hasher) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            hasher,
            progress_tx,
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan `root` and build a manifest keyed by relative POSIX path.
    ///
    /// A root that does not exist yet scans as empty. Excluded paths never
    /// appear in the result, whatever the scope.
    pub fn scan(
        &self,
        root: &Path,
        exclusions: &ExclusionSet,
        scope: ScanScope<'_>,
    ) -> Result<ScanOutput, ScanError> {
        let start = Instant::now();

        match std::fs::metadata(root) {
            Ok(meta) if !meta.is_dir() => {
                return Err(ScanError::NotADirectory {
                    path: root.to_path_buf(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet, nothing to hash", root.display());
                return Ok(ScanOutput::default());
            }
            Err(e) => return Err(ScanError::io(root, e)),
        }

        let mut warnings = Vec::new();
        let candidates = match scope {
            ScanScope::Full => self.collect_files(root, exclusions, &mut warnings),
            ScanScope::RemoteSubset(remote) => remote
                .keys()
                .filter(|key| !exclusions.is_excluded(key))
                .map(|key| (key.to_string(), root.join(key)))
                .collect(),
        };
        let only_existing = matches!(scope, ScanScope::RemoteSubset(_));

        let (manifest, hash_warnings) = self.hash_all(candidates, only_existing, start);
        warnings.extend(hash_warnings);

        for warning in &warnings {
            warn!("Skipping {}", warning.message);
        }

        let duration = start.elapsed();
        info!(
            "Hashed {} files ({} bytes) in {:.2}s",
            manifest.len(),
            manifest.total_size(),
            duration.as_secs_f64()
        );

        Ok(ScanOutput {
            manifest,
            warnings,
            duration,
        })
    }

    /// List every non-excluded file under `root`.
    fn collect_files(
        &self,
        root: &Path,
        exclusions: &ExclusionSet,
        warnings: &mut Vec<ScanWarning>,
    ) -> Vec<(String, PathBuf)> {
        let pruned = Arc::new(exclusions.clone());

        let walker = WalkDir::new(root)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            })
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .process_read_dir(move |_depth, _path, _state, children| {
                // Only direct children of the root can be excluded directories.
                children.retain(|child| match child {
                    Ok(entry) => {
                        !(entry.depth == 1
                            && entry.file_type.is_dir()
                            && pruned.excludes_top_level_dir(&entry.file_name.to_string_lossy()))
                    }
                    Err(_) => true,
                });
            });

        let mut files = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warnings.push(match err.io_error() {
                        Some(io) => ScanWarning::from_io(&path, io),
                        None => ScanWarning::new(&path, err.to_string(), WarningKind::ReadError),
                    });
                    continue;
                }
            };

            let path = entry.path();
            let file_type = entry.file_type();
            let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
            if !is_file {
                continue;
            }

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let Some(key) = path_to_key(relative) else {
                // Could never be listed, fetched or deleted under its real name.
                warnings.push(ScanWarning::new(
                    &path,
                    format!("{}: name is not a valid manifest key", path.display()),
                    WarningKind::ReadError,
                ));
                continue;
            };
            if exclusions.is_excluded(&key) {
                debug!("Excluded: {key}");
                continue;
            }

            files.push((key, path));
        }

        files
    }

    /// Hash candidate files in parallel.
    fn hash_all(
        &self,
        candidates: Vec<(String, PathBuf)>,
        only_existing: bool,
        start: Instant,
    ) -> (Manifest, Vec<ScanWarning>) {
        let total = candidates.len() as u64;
        let files_hashed = AtomicU64::new(0);
        let bytes_hashed = AtomicU64::new(0);
        let errors_count = AtomicU64::new(0);

        let results: Vec<Result<(String, ManifestEntry), Option<ScanWarning>>> = candidates
            .into_par_iter()
            .map(|(key, path)| {
                let result = self.hasher.entry_for(&path);
                match &result {
                    Ok(entry) => {
                        files_hashed.fetch_add(1, Ordering::Relaxed);
                        bytes_hashed.fetch_add(entry.size, Ordering::Relaxed);
                    }
                    Err(_) => {
                        errors_count.fetch_add(1, Ordering::Relaxed);
                    }
                }

                let _ = self.progress_tx.send(ScanProgress {
                    files_hashed: files_hashed.load(Ordering::Relaxed),
                    files_total: total,
                    bytes_hashed: bytes_hashed.load(Ordering::Relaxed),
                    current_path: path.clone(),
                    errors_count: errors_count.load(Ordering::Relaxed),
                    elapsed: start.elapsed(),
                });

                match result {
                    Ok(entry) => Ok((key, entry)),
                    // Absent remote-listed files are the reconciler's business.
                    Err(ScanError::NotFound { .. }) if only_existing => {
                        debug!("Not present locally: {key}");
                        Err(None)
                    }
                    Err(err) => Err(Some(ScanWarning::from_error(&err))),
                }
            })
            .collect();

        let mut manifest = Manifest::new();
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok((key, entry)) => {
                    manifest.insert(key, entry);
                }
                Err(Some(warning)) => warnings.push(warning),
                Err(None) => {}
            }
        }

        (manifest, warnings)
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}
