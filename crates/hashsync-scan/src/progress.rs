//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of files hashed so far.
    pub files_hashed: u64,
    /// Number of files the scan will hash.
    pub files_total: u64,
    /// Total bytes hashed so far.
    pub bytes_hashed: u64,
    /// File that was just hashed.
    pub current_path: PathBuf,
    /// Number of files skipped because of errors.
    pub errors_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new(files_total: u64) -> Self {
        Self {
            files_hashed: 0,
            files_total,
            bytes_hashed: 0,
            current_path: PathBuf::new(),
            errors_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Fraction of files done, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.files_total == 0 {
            1.0
        } else {
            (self.files_hashed + self.errors_count) as f64 / self.files_total as f64
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new(0)
    }
}
