//! Sync configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of concurrent downloads.
pub const DEFAULT_WORKERS: usize = 4;

/// Default read/write block size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Configuration for one sync run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    /// Destination directory, the root all manifest keys are relative to.
    #[builder(default = "PathBuf::from(\".\")")]
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Files or top-level directories to leave alone.
    #[builder(default)]
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Hash every local file instead of only those the remote lists.
    #[builder(default = "false")]
    #[serde(default)]
    pub full_rescan: bool,

    /// Delete local files the remote manifest does not list.
    #[builder(default = "false")]
    #[serde(default)]
    pub reset_to_remote: bool,

    /// Number of concurrent downloads.
    #[builder(default = "DEFAULT_WORKERS")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Block size for hashing and writing.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Root URL or directory files are fetched from.
    #[builder(default)]
    #[serde(default)]
    pub mirror: Option<String>,

    /// Skip the confirmation prompt.
    #[builder(default = "false")]
    #[serde(default)]
    pub assume_yes: bool,

    /// Give up waiting for confirmation after this many seconds.
    #[builder(default)]
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root
            && root.as_os_str().is_empty()
        {
            return Err("Root path cannot be empty".to_string());
        }
        if self.workers == Some(0) {
            return Err("At least one worker is required".to_string());
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be positive".to_string());
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Create a new sync config builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Create a default config syncing into `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
            full_rescan: false,
            reset_to_remote: false,
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mirror: None,
            assume_yes: false,
            prompt_timeout_secs: None,
        }
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    /// Validate values that serde cannot.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                message: "At least one worker is required".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "Chunk size must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the local scan must cover the whole tree.
    ///
    /// A reset needs the complete local listing, so it implies a full scan.
    pub fn scans_everything(&self) -> bool {
        self.full_rescan || self.reset_to_remote
    }

    /// Confirmation timeout, if any.
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_secs.map(Duration::from_secs)
    }

    /// The mirror root for a manifest source, ending in exactly one `/`.
    ///
    /// Uses the configured mirror if present, otherwise strips the final
    /// path segment from `manifest_source`.
    pub fn resolve_mirror(&self, manifest_source: &str) -> Result<String, ConfigError> {
        if let Some(mirror) = &self.mirror {
            return Ok(with_trailing_slash(mirror));
        }

        match manifest_source.rfind('/') {
            Some(idx) => Ok(manifest_source[..=idx].to_string()),
            None => Err(ConfigError::NoMirror {
                manifest_source: manifest_source.to_string(),
            }),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn with_trailing_slash(mirror: &str) -> String {
    format!("{}/", mirror.trim_end_matches('/'))
}
