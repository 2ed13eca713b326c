//! Resumable, verified, concurrent downloads.

use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hashsync_core::{ContentHash, DEFAULT_WORKERS, Manifest, ManifestEntry, ScanError};
use hashsync_scan::Hasher;

use crate::progress::DownloadEvent;
use crate::remote::{RemoteSource, TransportError, join_location};

/// Why a single file failed.
#[derive(Debug, Error)]
pub enum FailureKind {
    /// Network failure, non-success status or unreadable mirror file.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The downloaded bytes do not hash to the manifest digest.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    Corrupt {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Writing the destination file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Re-reading the file for verification failed.
    #[error("verification failed: {0}")]
    Verify(#[from] ScanError),

    /// The worker task panicked.
    #[error("worker failed: {0}")]
    Panicked(String),
}

/// A failed file and the reason.
#[derive(Debug, Error)]
#[error("{path}: {kind}")]
pub struct FileFailure {
    /// Manifest key of the file.
    pub path: String,
    /// What went wrong.
    #[source]
    pub kind: FailureKind,
}

/// Per-file outcome of a download run.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Files downloaded and verified.
    pub completed: Vec<String>,
    /// Files that failed.
    pub failures: Vec<FileFailure>,
    /// Files not finished because the run was cancelled.
    pub cancelled: Vec<String>,
    /// Bytes written to disk, including retries.
    pub bytes_written: u64,
}

impl DownloadReport {
    /// Whether every file was downloaded and verified.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }

    /// Number of files the run covered.
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failures.len() + self.cancelled.len()
    }

    /// Number of corrupt downloads.
    pub fn corrupt_count(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.kind, FailureKind::Corrupt { .. }))
            .count()
    }

    fn sort(&mut self) {
        self.completed.sort();
        self.cancelled.sort();
        self.failures.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// A download run that did not fully succeed.
///
/// Both variants carry the full report; re-running the sync retries
/// exactly what is still missing.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every file was attempted and at least one failed.
    #[error(
        "{} of {} files failed to download; run the sync again to retry",
        .report.failures.len(),
        .report.attempted()
    )]
    Incomplete { report: DownloadReport },

    /// The run was interrupted.
    #[error("Download interrupted with {} files unfinished", .report.cancelled.len())]
    Cancelled { report: DownloadReport },
}

impl DownloadError {
    /// The per-file report.
    pub fn report(&self) -> &DownloadReport {
        match self {
            Self::Incomplete { report } | Self::Cancelled { report } => report,
        }
    }
}

/// Fetches diff entries from a mirror into a destination directory.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download every entry from `mirror` into `dest`.
    ///
    /// Fails only after all files were attempted, or on cancellation.
    async fn download(
        &self,
        entries: &Manifest,
        mirror: &str,
        dest: &Path,
    ) -> Result<DownloadReport, DownloadError>;
}

/// Downloader running a bounded number of file transfers at once.
///
/// Each file is resumed with a ranged request when a shorter partial copy
/// is on disk, and re-hashed after the transfer. Manifest keys are unique,
/// so no two workers ever write the same path.
#[derive(Clone)]
pub struct ParallelDownloader {
    source: Arc<dyn RemoteSource>,
    hasher: Hasher,
    workers: usize,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<DownloadEvent>>,
}

impl ParallelDownloader {
    /// Create a downloader with default settings.
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            hasher: Hasher::new(),
            workers: DEFAULT_WORKERS,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Set the number of concurrent transfers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the hasher used for verification.
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send progress events to `events`.
    pub fn with_events(mut self, events: mpsc::Sender<DownloadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token that interrupts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl Downloader for ParallelDownloader {
    async fn download(
        &self,
        entries: &Manifest,
        mirror: &str,
        dest: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        self.emit(DownloadEvent::Queued {
            files: entries.len(),
            bytes: entries.total_size(),
        })
        .await;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut report = DownloadReport::default();
        let mut pending = entries.iter();

        for (key, entry) in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled.push(key.clone());
                break;
            };

            let job = FileJob {
                key: key.clone(),
                location: join_location(mirror, key),
                dest: dest.join(key),
                entry: *entry,
                source: Arc::clone(&self.source),
                hasher: self.hasher,
                cancel: self.cancel.clone(),
                events: self.events.clone(),
            };
            debug!("Queueing {} from {}", job.key, job.location);

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = AssertUnwindSafe(job.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(FailureKind::Panicked(format!("{} panicked", job.key)))
                    });
                (job.key, outcome)
            });
        }
        report
            .cancelled
            .extend(pending.map(|(key, _)| key.clone()));

        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Download task failed: {e}");
                    continue;
                }
            };

            match outcome {
                Ok(FileOutcome::Completed { bytes }) => {
                    report.bytes_written += bytes;
                    report.completed.push(key);
                }
                Ok(FileOutcome::Cancelled) => report.cancelled.push(key),
                Err(kind) => {
                    warn!("{key}: {kind}");
                    self.emit(DownloadEvent::Failed {
                        path: key.clone(),
                        reason: kind.to_string(),
                    })
                    .await;
                    report.failures.push(FileFailure { path: key, kind });
                }
            }
        }

        report.sort();
        info!(
            "Downloaded {} of {} files ({} bytes written)",
            report.completed.len(),
            entries.len(),
            report.bytes_written
        );

        if !report.cancelled.is_empty() {
            Err(DownloadError::Cancelled { report })
        } else if !report.failures.is_empty() {
            Err(DownloadError::Incomplete { report })
        } else {
            Ok(report)
        }
    }
}

enum FileOutcome {
    Completed { bytes: u64 },
    Cancelled,
}

enum Transfer {
    /// `start` is the number of bytes kept from the existing file.
    Done { written: u64, start: u64 },
    Cancelled,
}

/// One file's transfer. Owns its destination path for its lifetime.
struct FileJob {
    key: String,
    location: String,
    dest: PathBuf,
    entry: ManifestEntry,
    source: Arc<dyn RemoteSource>,
    hasher: Hasher,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<DownloadEvent>>,
}

impl FileJob {
    async fn run(&self) -> Result<FileOutcome, FailureKind> {
        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let remote_len = self
            .source
            .content_length(&self.location)
            .await?
            .unwrap_or(self.entry.size);
        let local_len = match fs::metadata(&self.dest).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };

        // Size check happens before the ranged request is issued.
        let offset = if local_len > 0 && local_len < remote_len {
            info!("{} is incomplete. Resuming download.", self.key);
            local_len
        } else {
            0
        };

        let (mut bytes, start) = match self.transfer(offset, remote_len).await? {
            Transfer::Done { written, start } => (written, start),
            Transfer::Cancelled => return Ok(FileOutcome::Cancelled),
        };

        if let Some(actual) = self.verify().await? {
            if start == 0 {
                return Err(self.corrupt(actual));
            }

            // The kept prefix was probably stale content; start over once.
            warn!(
                "{} failed verification after resuming, downloading it again",
                self.key
            );
            self.emit(DownloadEvent::Restarted {
                path: self.key.clone(),
                discarded: start + bytes,
            })
            .await;
            match self.transfer(0, remote_len).await? {
                Transfer::Done { written, .. } => bytes += written,
                Transfer::Cancelled => return Ok(FileOutcome::Cancelled),
            }
            if let Some(actual) = self.verify().await? {
                return Err(self.corrupt(actual));
            }
        }

        self.emit(DownloadEvent::Finished {
            path: self.key.clone(),
        })
        .await;
        Ok(FileOutcome::Completed { bytes })
    }

    /// Stream the body to disk, appending when the source honoured `offset`.
    async fn transfer(&self, offset: u64, total: u64) -> Result<Transfer, FailureKind> {
        let body = self.source.open(&self.location, offset).await?;

        let mut file = if body.start > 0 {
            OpenOptions::new().append(true).open(&self.dest).await?
        } else {
            File::create(&self.dest).await?
        };

        self.emit(DownloadEvent::Started {
            path: self.key.clone(),
            total,
            resumed_from: body.start,
        })
        .await;

        let mut stream = body.stream;
        let mut written: u64 = 0;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Whole blocks only; the partial file stays resumable.
                    file.flush().await?;
                    debug!("{} interrupted at byte {}", self.key, body.start + written);
                    return Ok(Transfer::Cancelled);
                }
                next = stream.next() => match next {
                    Some(chunk) => chunk?,
                    None => break,
                },
            };

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            self.emit(DownloadEvent::Advanced {
                path: self.key.clone(),
                bytes: chunk.len() as u64,
            })
            .await;
        }

        file.flush().await?;
        Ok(Transfer::Done {
            written,
            start: body.start,
        })
    }

    /// Hash the file on disk. Returns the actual hash on mismatch.
    async fn verify(&self) -> Result<Option<ContentHash>, FailureKind> {
        self.emit(DownloadEvent::Verifying {
            path: self.key.clone(),
        })
        .await;

        let hasher = self.hasher;
        let dest = self.dest.clone();
        let actual = tokio::task::spawn_blocking(move || hasher.entry_for(&dest))
            .await
            .map_err(|e| FailureKind::Panicked(e.to_string()))??;

        Ok((actual != self.entry).then_some(actual.hash))
    }

    fn corrupt(&self, actual: ContentHash) -> FailureKind {
        FailureKind::Corrupt {
            expected: self.entry.hash,
            actual,
        }
    }

    async fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
