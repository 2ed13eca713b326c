//! Core types for hashsync.
//!
//! This crate provides the data model shared by every other hashsync crate:
//! manifests (the "hashtable" describing a directory), diff results,
//! exclusion rules, configuration and the error taxonomy.

mod config;
mod error;
mod exclusion;
mod manifest;

pub use config::{DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS, SyncConfig, SyncConfigBuilder};
pub use error::{ConfigError, ManifestLoadError, ScanError, ScanWarning, WarningKind};
pub use exclusion::ExclusionSet;
pub use manifest::{
    ContentHash, DiffResult, HashParseError, Manifest, ManifestEntry, UnsafePath, normalize_key,
    path_to_key,
};
