//! Local-versus-remote manifest diffing.
//!
//! The local manifest is rebuilt from disk on every call and never cached,
//! so running a comparison twice without touching the tree yields the same
//! result.

use std::path::Path;

use tracing::debug;

use hashsync_core::{DiffResult, ExclusionSet, Manifest, ScanError, ScanWarning};
use hashsync_scan::{ScanScope, TreeScanner};

/// Outcome of a reconciliation: the diff plus the local view it came from.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Freshly generated local manifest.
    pub local: Manifest,
    /// Remote entries that need downloading.
    pub diff: DiffResult,
    /// Local files that could not be hashed. They are treated as absent.
    pub warnings: Vec<ScanWarning>,
}

/// Diff engine between a remote manifest and a local tree.
pub struct Reconciler {
    scanner: TreeScanner,
}

impl Reconciler {
    /// Create a reconciler with a default scanner.
    pub fn new() -> Self {
        Self {
            scanner: TreeScanner::new(),
        }
    }

    /// Create a reconciler around a configured scanner.
    pub fn with_scanner(scanner: TreeScanner) -> Self {
        Self { scanner }
    }

    /// The scanner, e.g. to subscribe to hashing progress.
    pub fn scanner(&self) -> &TreeScanner {
        &self.scanner
    }

    /// Compute which remote entries are missing or differ locally.
    ///
    /// With `full_rescan` every local file is hashed; otherwise only the
    /// paths the remote manifest lists.
    pub fn compare(
        &self,
        remote: &Manifest,
        root: &Path,
        exclusions: &ExclusionSet,
        full_rescan: bool,
    ) -> Result<DiffResult, ScanError> {
        self.reconcile(remote, root, exclusions, full_rescan)
            .map(|r| r.diff)
    }

    /// Like [`Reconciler::compare`], also returning the local manifest.
    pub fn reconcile(
        &self,
        remote: &Manifest,
        root: &Path,
        exclusions: &ExclusionSet,
        full_rescan: bool,
    ) -> Result<Reconciliation, ScanError> {
        let scope = if full_rescan {
            ScanScope::Full
        } else {
            ScanScope::RemoteSubset(remote)
        };

        let output = self.scanner.scan(root, exclusions, scope)?;
        let diff = diff_manifests(remote, &output.manifest, exclusions);

        debug!(
            "Compared: {} of {} remote entries differ ({} bytes)",
            diff.len(),
            remote.len(),
            diff.total_bytes()
        );

        Ok(Reconciliation {
            local: output.manifest,
            diff,
            warnings: output.warnings,
        })
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote entries that are absent from `local` or whose hash or size
/// differ. Excluded keys are skipped.
///
/// The byte total uses the remote sizes, since those are what will be
/// transferred.
pub fn diff_manifests(
    remote: &Manifest,
    local: &Manifest,
    exclusions: &ExclusionSet,
) -> DiffResult {
    let entries: Manifest = remote
        .iter()
        .filter(|(key, _)| !exclusions.is_excluded(key))
        .filter(|(key, entry)| local.get(key) != Some(*entry))
        .map(|(key, entry)| (key.clone(), *entry))
        .collect();

    DiffResult::new(entries)
}
