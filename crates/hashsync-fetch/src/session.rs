//! One generate, verify or sync run against a destination directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hashsync_core::{
    ConfigError, DiffResult, ExclusionSet, Manifest, ManifestLoadError, ScanError, ScanWarning,
    SyncConfig,
};
use hashsync_reconcile::{Reconciler, Reconciliation, ResetCoordinator, ResetReport, stale_paths};
use hashsync_scan::{Hasher, ScanScope, TreeScanner};

use crate::confirm::{Confirm, Confirmation};
use crate::download::{DownloadError, DownloadReport, Downloader};
use crate::remote::{RemoteSource, TransportError};
use crate::store::{DumpError, ManifestStore};

/// Errors that abort a run before any file is transferred.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Manifest(#[from] ManifestLoadError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dump(#[from] DumpError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),
}

/// What a sync would do, shown to the user before anything changes.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Remote entries to download.
    pub diff: DiffResult,
    /// Local files a reset would delete. Empty unless resetting.
    pub stale: Vec<String>,
    /// The freshly scanned local manifest.
    pub local: Manifest,
    /// Local files that could not be hashed.
    pub warnings: Vec<ScanWarning>,
}

impl SyncPlan {
    /// Whether the run has nothing to download and nothing to delete.
    pub fn is_noop(&self) -> bool {
        self.diff.is_empty() && self.stale.is_empty()
    }

    /// Bytes the download will transfer.
    pub fn download_bytes(&self) -> u64 {
        self.diff.total_bytes()
    }
}

/// Result of [`SyncSession::run`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// All files validated; nothing was changed.
    UpToDate,
    /// The confirmation was declined or timed out; nothing was changed.
    Declined(Confirmation),
    /// Cancelled before anything was changed.
    Interrupted,
    /// The sync ran.
    Synced {
        /// Set when stale files were deleted.
        reset: Option<ResetReport>,
        /// Outcome of the download step.
        download: Result<DownloadReport, DownloadError>,
    },
}

impl SyncOutcome {
    /// Whether the destination now matches the remote manifest.
    pub fn is_success(&self) -> bool {
        match self {
            Self::UpToDate | Self::Declined(_) => true,
            Self::Interrupted => false,
            Self::Synced { reset, download } => {
                download.is_ok() && reset.as_ref().is_none_or(ResetReport::is_success)
            }
        }
    }
}

/// Ties the scanner, reconciler, store, reset and downloader together for
/// one destination.
pub struct SyncSession {
    config: SyncConfig,
    exclusions: ExclusionSet,
    reconciler: Arc<Reconciler>,
    source: Option<Arc<dyn RemoteSource>>,
    cancel: CancellationToken,
}

impl SyncSession {
    /// Create a session. Exclusions are resolved against the root now.
    pub fn new(config: SyncConfig) -> Self {
        let exclusions = ExclusionSet::build(&config.root, &config.exclude);
        let scanner = TreeScanner::with_hasher(Hasher::with_chunk_size(config.chunk_size));
        Self {
            config,
            exclusions,
            reconciler: Arc::new(Reconciler::with_scanner(scanner)),
            source: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Load manifests through `source` instead of picking one by location.
    pub fn with_source(mut self, source: Arc<dyn RemoteSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Stop before the reset and download once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The reconciler, e.g. to subscribe to scan progress.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Fetch and validate the remote manifest.
    pub async fn load_remote(&self, location: &str) -> Result<Manifest, SessionError> {
        let store = match &self.source {
            Some(source) => ManifestStore::new(Arc::clone(source)),
            None => ManifestStore::for_location(location)?,
        };
        Ok(store.load(location).await?)
    }

    /// Hash the whole destination and write the manifest to `dest`.
    ///
    /// A previous manifest at `dest` inside the root is left out of the
    /// scan; it is about to be overwritten.
    pub async fn generate(&self, dest: &Path) -> Result<(PathBuf, Manifest), SessionError> {
        let reconciler = Arc::clone(&self.reconciler);
        let root = self.config.root.clone();
        let mut exclusions = self.exclusions.clone();
        if let Some(key) = exclusions.exclude_existing_file(&root, dest) {
            debug!("Leaving the output file {key} out of the hashtable");
        }

        let output = tokio::task::spawn_blocking(move || {
            reconciler
                .scanner()
                .scan(&root, &exclusions, ScanScope::Full)
        })
        .await??;
        log_warnings(&output.warnings);

        let written = ManifestStore::dump(&output.manifest, dest)?;
        Ok((written, output.manifest))
    }

    /// Compare the destination with the manifest at `location`.
    ///
    /// Read-only; differences are not errors.
    pub async fn verify(&self, location: &str) -> Result<Reconciliation, SessionError> {
        let remote = self.load_remote(location).await?;
        self.reconcile(&remote, self.config.full_rescan).await
    }

    /// Work out what a sync against `remote` would do.
    pub async fn plan(&self, remote: &Manifest) -> Result<SyncPlan, SessionError> {
        let Reconciliation {
            local,
            diff,
            warnings,
        } = self.reconcile(remote, self.config.scans_everything()).await?;

        let stale = if self.config.reset_to_remote {
            stale_paths(&local, remote)
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Ok(SyncPlan {
            diff,
            stale,
            local,
            warnings,
        })
    }

    /// Bring the destination in line with the manifest at `location`.
    ///
    /// Nothing on disk changes until `confirm` agrees (or `assume_yes` is
    /// set). The reset, if requested, runs just before the download.
    pub async fn run(
        &self,
        location: &str,
        confirm: &dyn Confirm,
        downloader: &dyn Downloader,
    ) -> Result<SyncOutcome, SessionError> {
        let mirror = self.config.resolve_mirror(location)?;
        info!("Using mirror: {mirror}");

        let remote = self.load_remote(location).await?;
        let plan = self.plan(&remote).await?;

        if plan.is_noop() {
            info!("All files validated, nothing to download");
            return Ok(SyncOutcome::UpToDate);
        }
        debug!(
            "Plan: {} files to download ({} bytes), {} to delete",
            plan.diff.len(),
            plan.download_bytes(),
            plan.stale.len()
        );

        let answer = self.ask(confirm, &plan).await;
        // An interrupt while the prompt is open wins over whatever it answered.
        if self.cancel.is_cancelled() {
            return Ok(SyncOutcome::Interrupted);
        }
        if !answer.is_proceed() {
            info!("Cancelled by user, quitting");
            return Ok(SyncOutcome::Declined(answer));
        }

        let reset = if plan.stale.is_empty() {
            None
        } else {
            let local = plan.local.clone();
            let root = self.config.root.clone();
            let remote = remote.clone();
            Some(
                tokio::task::spawn_blocking(move || {
                    ResetCoordinator::new().reset(&local, &remote, &root)
                })
                .await?,
            )
        };

        let download = if plan.diff.is_empty() {
            Ok(DownloadReport::default())
        } else {
            downloader
                .download(plan.diff.entries(), &mirror, &self.config.root)
                .await
        };

        Ok(SyncOutcome::Synced { reset, download })
    }

    async fn ask(&self, confirm: &dyn Confirm, plan: &SyncPlan) -> Confirmation {
        if self.config.assume_yes {
            return Confirmation::Proceed;
        }
        match self.config.prompt_timeout() {
            Some(limit) => tokio::time::timeout(limit, confirm.confirm(plan))
                .await
                .unwrap_or(Confirmation::TimedOut),
            None => confirm.confirm(plan).await,
        }
    }

    async fn reconcile(
        &self,
        remote: &Manifest,
        full: bool,
    ) -> Result<Reconciliation, SessionError> {
        let reconciler = Arc::clone(&self.reconciler);
        let root = self.config.root.clone();
        let exclusions = self.exclusions.clone();
        let remote = remote.clone();

        let reconciliation = tokio::task::spawn_blocking(move || {
            reconciler.reconcile(&remote, &root, &exclusions, full)
        })
        .await??;
        log_warnings(&reconciliation.warnings);
        Ok(reconciliation)
    }
}

/// Skipped files end up in the diff, so they are only logged.
fn log_warnings(warnings: &[ScanWarning]) {
    for warning in warnings {
        warn!("Skipped {}: {}", warning.path.display(), warning.message);
    }
}

