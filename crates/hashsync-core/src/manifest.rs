//! Manifest types.
//!
//! A manifest maps relative POSIX paths to the SHA-256 digest and size of
//! the file at that path. On disk it is a JSON object:
//!
//! ```json
//! { "data/a.bin": { "hash": "<sha256-hex>", "size": 1024 } }
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::ManifestLoadError;

/// SHA-256 content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

/// Error parsing a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// The digest has the wrong number of hex characters for SHA-256.
    #[error("expected 64 hex characters, found {len}")]
    WrongLength { len: usize },

    /// The digest contains non-hex characters.
    #[error("digest is not valid hex")]
    InvalidHex,
}

impl ContentHash {
    /// Number of hex characters in a SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest (either case).
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.len() != Self::HEX_LEN {
            return Err(HashParseError::WrongLength { len: s.len() });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HashParseError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash and size of a single file.
///
/// Two entries are equal only if both the hash and the size match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Digest of the file's bytes at hash time.
    pub hash: ContentHash,
    /// On-disk size at hash time.
    pub size: u64,
}

impl ManifestEntry {
    /// Create a new entry.
    pub fn new(hash: ContentHash, size: u64) -> Self {
        Self { hash, size }
    }
}

/// Mapping from relative POSIX path to [`ManifestEntry`].
///
/// Keys are kept sorted so serialized manifests diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

/// Wire shape used while validating an untrusted manifest.
#[derive(Deserialize)]
struct RawEntry {
    hash: String,
    size: u64,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a manifest from JSON bytes.
    ///
    /// `source` names where the bytes came from and is only used in errors.
    /// Keys are normalized with [`normalize_key`]; keys escaping the root and
    /// digests that are not SHA-256 are rejected.
    pub fn parse(bytes: &[u8], source: &str) -> Result<Self, ManifestLoadError> {
        let raw: BTreeMap<String, RawEntry> =
            serde_json::from_slice(bytes).map_err(|e| ManifestLoadError::Parse {
                source_name: source.to_string(),
                source: e,
            })?;

        let mut manifest = Self::new();
        for (key, raw_entry) in raw {
            let normalized = normalize_key(&key).map_err(|_| ManifestLoadError::UnsafePath {
                path: key.clone(),
            })?;

            let hash = ContentHash::from_hex(&raw_entry.hash).map_err(|e| match e {
                HashParseError::WrongLength { len } => ManifestLoadError::HashAlgorithmMismatch {
                    path: key.clone(),
                    found_len: len,
                },
                HashParseError::InvalidHex => ManifestLoadError::InvalidHash { path: key.clone() },
            })?;

            let entry = ManifestEntry::new(hash, raw_entry.size);
            if let Some(previous) = manifest.entries.insert(normalized.clone(), entry)
                && previous != entry
            {
                return Err(ManifestLoadError::DuplicateKey { path: normalized });
            }
        }

        Ok(manifest)
    }

    /// Serialize as pretty JSON with four-space indentation.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// Whether the manifest contains a key.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert an entry, returning the previous entry for the key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        entry: ManifestEntry,
    ) -> Option<ManifestEntry> {
        self.entries.insert(key.into(), entry)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ManifestEntry> {
        self.entries.iter()
    }

    /// Iterate keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Sum of all entry sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }
}

impl FromIterator<(String, ManifestEntry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, ManifestEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Manifest {
    type Item = (String, ManifestEntry);
    type IntoIter = btree_map::IntoIter<String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a ManifestEntry);
    type IntoIter = btree_map::Iter<'a, String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Entries of a remote manifest that must be fetched.
///
/// `total_bytes` is always the sum of the remote sizes of `entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    entries: Manifest,
    total_bytes: u64,
}

impl DiffResult {
    /// Build a diff result, computing the byte total from the entries.
    pub fn new(entries: Manifest) -> Self {
        let total_bytes = entries.total_size();
        Self {
            entries,
            total_bytes,
        }
    }

    /// Files to download, keyed by relative path.
    pub fn entries(&self) -> &Manifest {
        &self.entries
    }

    /// Total bytes to download.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of files in the diff.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the local tree is already in sync.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Differing paths in sorted order.
    pub fn paths(&self) -> Vec<&str> {
        self.entries.keys().collect()
    }
}

/// A manifest key that would resolve outside the manifest root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path escapes the manifest root: {0}")]
pub struct UnsafePath(pub String);

/// Normalize a manifest key to a relative POSIX path.
///
/// Backslashes become `/`, empty and `.` components are dropped. Absolute
/// paths, a leading drive prefix and `..` components are rejected. Colons
/// anywhere else are ordinary file name characters.
pub fn normalize_key(key: &str) -> Result<String, UnsafePath> {
    let unsafe_path = || UnsafePath(key.to_string());

    if key.starts_with('/') || key.starts_with('\\') {
        return Err(unsafe_path());
    }

    let mut parts = Vec::new();
    for part in key.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            p if parts.is_empty() && has_drive_prefix(p) => return Err(unsafe_path()),
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(unsafe_path());
    }

    Ok(parts.join("/"))
}

/// Convert a path relative to a scan root into a manifest key.
///
/// Returns `None` when the path is not purely relative, is not valid UTF-8,
/// or would not load back through [`normalize_key`].
pub fn path_to_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str()?;
                if parts.is_empty() && has_drive_prefix(part) {
                    return None;
                }
                parts.push(part);
            }
            Component::CurDir => continue,
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// `C:`, `c:foo` and the like.
fn has_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
