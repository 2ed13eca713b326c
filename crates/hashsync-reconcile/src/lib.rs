//! Reconciliation of a local directory against a remote manifest.
//!
//! - [`Reconciler`] hashes the local tree and diffs it against the remote
//!   manifest, producing the set of files to download.
//! - [`ResetCoordinator`] deletes local files the remote manifest does not
//!   list, for reset-to-remote runs.

mod reconciler;
mod reset;

pub use reconciler::{Reconciler, Reconciliation, diff_manifests};
pub use reset::{DeletionError, ResetCoordinator, ResetReport, stale_paths};
