//! Progress events emitted while downloading.

/// A progress event from a download run.
///
/// Events for different files interleave; events for one file arrive in
/// order `Started`, `Advanced`*, `Verifying`, then `Finished` or `Failed`.
/// A resumed file that fails verification is fetched again from byte zero:
/// its first `Verifying` is followed by `Restarted` and a second
/// `Started`, `Advanced`*, `Verifying` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The run is about to start.
    Queued { files: usize, bytes: u64 },
    /// A file transfer started.
    Started {
        path: String,
        /// Expected size of the complete file.
        total: u64,
        /// Bytes already on disk that are being kept.
        resumed_from: u64,
    },
    /// Bytes were written for a file.
    Advanced { path: String, bytes: u64 },
    /// A file is being hashed after the transfer.
    Verifying { path: String },
    /// A resumed file failed verification and is being fetched again.
    ///
    /// `discarded` bytes reported so far by `Started` and `Advanced` no
    /// longer count.
    Restarted { path: String, discarded: u64 },
    /// A file was downloaded and verified.
    Finished { path: String },
    /// A file failed.
    Failed { path: String, reason: String },
}

impl DownloadEvent {
    /// Path the event refers to, if it is per-file.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Queued { .. } => None,
            Self::Started { path, .. }
            | Self::Advanced { path, .. }
            | Self::Verifying { path }
            | Self::Restarted { path, .. }
            | Self::Finished { path }
            | Self::Failed { path, .. } => Some(path),
        }
    }
}
