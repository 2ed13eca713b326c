//! Loading and dumping manifests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use hashsync_core::{Manifest, ManifestLoadError};

use crate::remote::{RemoteSource, TransportError, source_for};

/// Errors writing a manifest.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads manifests from a URL or path and writes them to disk.
#[derive(Clone)]
pub struct ManifestStore {
    source: Arc<dyn RemoteSource>,
}

impl ManifestStore {
    /// Create a store reading through `source`.
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }

    /// Create a store with the transport matching `location`.
    pub fn for_location(location: &str) -> Result<Self, TransportError> {
        Ok(Self::new(source_for(location)?))
    }

    /// Fetch and validate the manifest at `location`.
    pub async fn load(&self, location: &str) -> Result<Manifest, ManifestLoadError> {
        debug!("Loading manifest from {location}");
        let bytes = self.source.fetch(location).await.map_err(|e| match e {
            TransportError::Io { location, source } => ManifestLoadError::Io {
                path: PathBuf::from(location),
                source,
            },
            other => ManifestLoadError::Transport {
                url: location.to_string(),
                message: other.to_string(),
            },
        })?;

        let manifest = Manifest::parse(&bytes, location)?;
        info!("Loaded {} entries from {location}", manifest.len());
        Ok(manifest)
    }

    /// Read and validate a manifest file without going through a transport.
    pub fn load_file(path: &Path) -> Result<Manifest, ManifestLoadError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Manifest::parse(&bytes, &path.display().to_string())
    }

    /// Write `manifest` as indented JSON to `dest`.
    ///
    /// Returns the absolute path written.
    pub fn dump(manifest: &Manifest, dest: &Path) -> Result<PathBuf, DumpError> {
        let json = manifest.to_pretty_json()?;
        let io_err = |source| DumpError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(dest, json).map_err(io_err)?;

        let written = dest.canonicalize().map_err(io_err)?;
        info!("Wrote {} entries to {}", manifest.len(), written.display());
        Ok(written)
    }
}
