//! Fetching side of hashsync.
//!
//! This crate loads manifests, downloads the files a diff calls for and
//! wires the whole run together:
//!
//! - [`RemoteSource`] abstracts the transport ([`HttpSource`] for mirrors
//!   served over HTTP(S), [`DirectorySource`] for mirrors on a local or
//!   mounted filesystem).
//! - [`ManifestStore`] loads and dumps manifests.
//! - [`ParallelDownloader`] fetches files concurrently, resuming partial
//!   files with ranged requests and verifying every file's SHA-256.
//! - [`SyncSession`] runs generate, verify and sync for one destination.
//!
//! Progress is reported through [`DownloadEvent`]s on a channel, following
//! the same pattern as the scanner's progress updates.

mod confirm;
mod download;
mod progress;
mod remote;
mod session;
mod store;

pub use confirm::{AssumeYes, Confirm, Confirmation};
pub use download::{
    DownloadError, DownloadReport, Downloader, FailureKind, FileFailure, ParallelDownloader,
};
pub use progress::DownloadEvent;
pub use remote::{
    BodyStream, DirectorySource, HttpSource, RemoteBody, RemoteSource, TransportError, is_url,
    join_location, source_for,
};
pub use session::{SessionError, SyncOutcome, SyncPlan, SyncSession};
pub use store::{DumpError, ManifestStore};

/// Default channel buffer size for download events.
pub const EVENT_CHANNEL_SIZE: usize = 256;
