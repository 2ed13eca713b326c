//! Error types for scanning, manifest loading and configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that stop a scan before it starts.
///
/// Failures on individual files are recorded as [`ScanWarning`]s instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// File disappeared between discovery and hashing.
    Vanished,
    /// Permission was denied.
    PermissionDenied,
    /// Error reading file/directory.
    ReadError,
}

/// Non-fatal warning encountered during scan.
///
/// The affected file is left out of the generated manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying it by kind.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        let kind = match error.kind() {
            std::io::ErrorKind::NotFound => WarningKind::Vanished,
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => WarningKind::ReadError,
        };
        Self {
            message: format!("{}: {error}", path.display()),
            path,
            kind,
        }
    }

    /// Downgrade a per-file scan error to a warning.
    pub fn from_error(error: &ScanError) -> Self {
        let (path, kind) = match error {
            ScanError::NotFound { path } => (path, WarningKind::Vanished),
            ScanError::PermissionDenied { path } => (path, WarningKind::PermissionDenied),
            ScanError::Io { path, .. } | ScanError::NotADirectory { path } => {
                (path, WarningKind::ReadError)
            }
        };
        Self {
            path: path.clone(),
            message: error.to_string(),
            kind,
        }
    }
}

/// Errors loading a manifest. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ManifestLoadError {
    /// Reading a local manifest file failed.
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote manifest failed.
    #[error("Failed to fetch manifest {url}: {message}")]
    Transport { url: String, message: String },

    /// The manifest is not valid JSON of the expected shape.
    #[error("Malformed manifest {source_name}: {source}")]
    Parse {
        source_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A key resolves outside the manifest root.
    #[error("Manifest key escapes the destination root: {path}")]
    UnsafePath { path: String },

    /// A digest has the wrong length for SHA-256, e.g. an MD5 manifest.
    #[error(
        "Manifest entry {path} has a {found_len}-character digest; expected a 64-character SHA-256 digest (manifest generated with a different hash algorithm?)"
    )]
    HashAlgorithmMismatch { path: String, found_len: usize },

    /// A digest is not valid hex.
    #[error("Manifest entry {path} has an invalid digest")]
    InvalidHash { path: String },

    /// Two keys normalize to the same path with different entries.
    #[error("Manifest lists {path} more than once with different content")]
    DuplicateKey { path: String },
}

/// Errors building a [`crate::SyncConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a configuration file failed.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// No mirror was configured and none could be derived.
    #[error("Cannot derive a mirror from {manifest_source}; pass one explicitly")]
    NoMirror { manifest_source: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));
    }

    #[test]
    fn test_scan_warning_from_io() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let warning = ScanWarning::from_io("/test/path", &err);
        assert_eq!(warning.kind, WarningKind::Vanished);
        assert!(warning.message.contains("gone"));
    }
}
