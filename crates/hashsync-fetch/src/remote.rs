//! Transports for manifests and mirror files.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use thiserror::Error;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Errors fetching from a remote source.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be built.
    #[error("Failed to initialise HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed before a response arrived, or mid-body.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Reading from a directory mirror failed.
    #[error("Failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// Byte stream of a remote body.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response body opened at some offset.
pub struct RemoteBody {
    /// Offset of the first byte of `stream` within the remote file.
    ///
    /// Zero when the source ignored the requested offset and sent the
    /// whole file.
    pub start: u64,
    /// The body.
    pub stream: BodyStream,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

/// Fetch capability used for manifests and mirror files.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a whole body.
    async fn fetch(&self, location: &str) -> Result<Bytes, TransportError>;

    /// Size of the body without transferring it, if the source knows.
    async fn content_length(&self, location: &str) -> Result<Option<u64>, TransportError>;

    /// Stream the body starting at byte `offset`.
    async fn open(&self, location: &str, offset: u64) -> Result<RemoteBody, TransportError>;
}

/// Whether a location is an HTTP(S) URL rather than a filesystem path.
pub fn is_url(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join a mirror root and a manifest key with exactly one `/` between them.
pub fn join_location(mirror: &str, key: &str) -> String {
    format!(
        "{}/{}",
        mirror.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Pick the transport for a location.
pub fn source_for(location: &str) -> Result<Arc<dyn RemoteSource>, TransportError> {
    if is_url(location) {
        Ok(Arc::new(HttpSource::new()?))
    } else {
        Ok(Arc::new(DirectorySource::new()))
    }
}

/// HTTP(S) transport.
///
/// Uses `HEAD` for sizes and `Range: bytes=N-` to resume.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source with a default client.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hashsync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }

    /// Create a source around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, TransportError> {
        request.send().await.map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch(&self, location: &str) -> Result<Bytes, TransportError> {
        let response = self.send(self.client.get(location), location).await?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: location.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.bytes().await.map_err(|source| TransportError::Request {
            url: location.to_string(),
            source,
        })
    }

    async fn content_length(&self, location: &str) -> Result<Option<u64>, TransportError> {
        let response = self.send(self.client.head(location), location).await?;
        if !response.status().is_success() {
            debug!("HEAD {location} returned {}, size unknown", response.status());
            return Ok(None);
        }
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    async fn open(&self, location: &str, offset: u64) -> Result<RemoteBody, TransportError> {
        let mut request = self.client.get(location);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = self.send(request, location).await?;
        let start = match response.status() {
            StatusCode::PARTIAL_CONTENT => offset,
            status if status.is_success() => {
                if offset > 0 {
                    debug!("{location} ignored the range request, fetching whole file");
                }
                0
            }
            status => {
                return Err(TransportError::Status {
                    url: location.to_string(),
                    status: status.as_u16(),
                });
            }
        };

        let url = location.to_string();
        let stream = response
            .bytes_stream()
            .map_err(move |source| TransportError::Request {
                url: url.clone(),
                source,
            })
            .boxed();

        Ok(RemoteBody { start, stream })
    }
}

/// Mirror on a local or mounted filesystem.
///
/// Locations are plain paths; offsets are honoured by seeking.
#[derive(Debug, Clone, Default)]
pub struct DirectorySource {
    read_capacity: Option<usize>,
}

impl DirectorySource {
    /// Create a directory source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific read buffer size for streamed bodies.
    pub fn with_read_capacity(capacity: usize) -> Self {
        Self {
            read_capacity: Some(capacity.max(1)),
        }
    }
}

fn io_error(location: &str) -> impl FnOnce(io::Error) -> TransportError + '_ {
    move |source| TransportError::Io {
        location: location.to_string(),
        source,
    }
}

#[async_trait]
impl RemoteSource for DirectorySource {
    async fn fetch(&self, location: &str) -> Result<Bytes, TransportError> {
        tokio::fs::read(location)
            .await
            .map(Bytes::from)
            .map_err(io_error(location))
    }

    async fn content_length(&self, location: &str) -> Result<Option<u64>, TransportError> {
        let meta = tokio::fs::metadata(location)
            .await
            .map_err(io_error(location))?;
        Ok(Some(meta.len()))
    }

    async fn open(&self, location: &str, offset: u64) -> Result<RemoteBody, TransportError> {
        let mut file = tokio::fs::File::open(PathBuf::from(location))
            .await
            .map_err(io_error(location))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(io_error(location))?;
        }

        let owned = location.to_string();
        let reader = match self.read_capacity {
            Some(capacity) => ReaderStream::with_capacity(file, capacity),
            None => ReaderStream::new(file),
        };
        let stream = reader
            .map_err(move |source| TransportError::Io {
                location: owned.clone(),
                source,
            })
            .boxed();

        Ok(RemoteBody {
            start: offset,
            stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://cdn.example.com/hashtable.json"));
        assert!(is_url("HTTP://cdn.example.com/"));
        assert!(!is_url("/srv/mirror/hashtable.json"));
        assert!(!is_url("mirror/hashtable.json"));
    }

    #[test]
    fn test_join_location() {
        assert_eq!(
            join_location("https://cdn.example.com/game/", "data/a.bin"),
            "https://cdn.example.com/game/data/a.bin"
        );
        assert_eq!(join_location("mirror", "a.bin"), "mirror/a.bin");
        assert_eq!(join_location("mirror//", "/a.bin"), "mirror/a.bin");
    }

    #[tokio::test]
    async fn test_directory_source_offsets() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let location = path.to_string_lossy().into_owned();

        let source = DirectorySource::with_read_capacity(3);
        assert_eq!(source.content_length(&location).await.unwrap(), Some(10));
        assert_eq!(&source.fetch(&location).await.unwrap()[..], b"0123456789");

        let body = source.open(&location, 4).await.unwrap();
        assert_eq!(body.start, 4);
        let chunks: Vec<Bytes> = body.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"456789");
    }

    #[tokio::test]
    async fn test_directory_source_missing_file() {
        let source = DirectorySource::new();
        let err = source.fetch("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
    }
}
