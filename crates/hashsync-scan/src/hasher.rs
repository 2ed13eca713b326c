//! Chunked SHA-256 file hashing.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::trace;

use hashsync_core::{ContentHash, DEFAULT_CHUNK_SIZE, ManifestEntry, ScanError};

/// Streams files through SHA-256 with a fixed-size buffer.
///
/// Memory use is bounded by the chunk size regardless of file size.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    chunk_size: usize,
}

impl Hasher {
    /// Create a hasher with the default 1 MiB chunk size.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a hasher with a custom chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash a file.
    pub fn hash_file(&self, path: &Path) -> Result<ContentHash, ScanError> {
        self.entry_for(path).map(|entry| entry.hash)
    }

    /// Hash a file and record its size.
    ///
    /// The size is the number of bytes actually hashed, so the two fields
    /// always describe the same content.
    pub fn entry_for(&self, path: &Path) -> Result<ManifestEntry, ScanError> {
        self.entry_with_progress(path, |_| {})
    }

    /// Hash a file, reporting the bytes processed after every chunk.
    pub fn entry_with_progress(
        &self,
        path: &Path,
        on_bytes: impl FnMut(u64),
    ) -> Result<ManifestEntry, ScanError> {
        trace!("Hashing: {}", path.display());
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        self.hash_reader(file, on_bytes)
            .map_err(|e| ScanError::io(path, e))
    }

    /// Hash everything readable from `reader`.
    pub fn hash_reader(
        &self,
        mut reader: impl Read,
        mut on_bytes: impl FnMut(u64),
    ) -> io::Result<ManifestEntry> {
        let mut sha = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut size: u64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            sha.update(&buf[..n]);
            size += n as u64;
            on_bytes(n as u64);
        }

        Ok(ManifestEntry::new(ContentHash::new(sha.finalize().into()), size))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(Sha256::digest(bytes).into())
}
