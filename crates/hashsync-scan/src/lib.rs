//! Directory hashing for hashsync.
//!
//! This crate turns a directory tree into a [`Manifest`]: every file is
//! streamed through SHA-256 in bounded chunks and recorded under its
//! relative POSIX path.
//!
//! # Example
//!
//! ```rust,no_run
//! use hashsync_scan::{ExclusionSet, ScanScope, TreeScanner};
//!
//! let scanner = TreeScanner::new();
//! let output = scanner
//!     .scan("/srv/game".as_ref(), &ExclusionSet::empty(), ScanScope::Full)
//!     .unwrap();
//!
//! println!("{} files, {} bytes", output.manifest.len(), output.manifest.total_size());
//! ```
//!
//! # Progress Monitoring
//!
//! Subscribe to progress updates before scanning:
//!
//! ```rust,no_run
//! use hashsync_scan::TreeScanner;
//!
//! let scanner = TreeScanner::new();
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Hashed {} files", progress.files_hashed);
//!     }
//! });
//! ```

mod hasher;
mod progress;
mod scanner;

pub use hasher::{Hasher, hash_bytes};
pub use progress::ScanProgress;
pub use scanner::{ScanOutput, ScanScope, TreeScanner};

// Re-export core types for convenience
pub use hashsync_core::{
    ContentHash, ExclusionSet, Manifest, ManifestEntry, ScanError, ScanWarning, WarningKind,
};
