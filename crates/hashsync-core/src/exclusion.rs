//! Exclusion rules for scans and syncs.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::manifest::{normalize_key, path_to_key};

/// Paths a run must neither hash, download nor delete.
///
/// Built once per run from user input. Each item is resolved against the
/// root and classified as a directory or a file by what exists on disk at
/// build time; items that exist as neither are dropped.
///
/// Directory exclusions match the *first* component of a relative path
/// only, so `build` excludes `build/x.bin` but `assets/cache` matches
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    directories: BTreeSet<String>,
    files: BTreeSet<String>,
}

impl ExclusionSet {
    /// An exclusion set that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Classify user-supplied paths relative to `root`.
    pub fn build<S: AsRef<str>>(root: &Path, items: &[S]) -> Self {
        let mut set = Self::default();

        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() {
                continue;
            }
            debug!("Exclude - processing: {item}");

            let Some(key) = relative_key(root, item) else {
                debug!("Exclude - {item} is outside {}, ignoring", root.display());
                continue;
            };

            let full = root.join(&key);
            if full.is_dir() {
                if key.contains('/') {
                    warn!(
                        "Only top-level directories can be excluded; {key} will not match anything"
                    );
                }
                debug!("Exclude - {key} is directory");
                set.directories.insert(key);
            } else if full.is_file() {
                debug!("Exclude - {key} is file");
                set.files.insert(key);
            } else {
                debug!("Exclude - {key} does not exist, ignoring");
            }
        }

        debug!("Excluded directories: {:?}", set.directories);
        debug!("Excluded files: {:?}", set.files);
        set
    }

    /// Build directly from already-classified keys.
    pub fn from_parts(
        directories: impl IntoIterator<Item = String>,
        files: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            directories: directories.into_iter().collect(),
            files: files.into_iter().collect(),
        }
    }

    /// Also exclude the existing file at `path` if it lies under `root`.
    ///
    /// Both paths are canonicalized, so `path` may be relative to the
    /// working directory. Returns the key that was added.
    pub fn exclude_existing_file(&mut self, root: &Path, path: &Path) -> Option<String> {
        let root = root.canonicalize().ok()?;
        let path = path.canonicalize().ok()?;
        if !path.is_file() {
            return None;
        }
        let key = path.strip_prefix(&root).ok().and_then(path_to_key)?;
        self.files.insert(key.clone());
        Some(key)
    }

    /// Whether a manifest key is excluded.
    pub fn is_excluded(&self, key: &str) -> bool {
        if self.files.contains(key) {
            return true;
        }
        match key.split_once('/') {
            Some((top, _)) => self.directories.contains(top),
            None => false,
        }
    }

    /// Whether a top-level directory name is excluded.
    pub fn excludes_top_level_dir(&self, name: &str) -> bool {
        self.directories.contains(name)
    }

    /// Excluded directory keys.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.directories.iter().map(String::as_str)
    }

    /// Excluded file keys.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Whether nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Resolve an exclusion item to a key relative to `root`.
fn relative_key(root: &Path, item: &str) -> Option<String> {
    let path = Path::new(item);
    if !path.is_absolute() {
        return normalize_key(item).ok();
    }

    if let Ok(rel) = path.strip_prefix(root) {
        return path_to_key(rel);
    }

    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().and_then(path_to_key)
}
