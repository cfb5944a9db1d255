//! Request body sources.
//!
//! A body source is a byte stream with an optional known size. It can be read
//! from stdin (`-`), a local file, or an `http(s)://` endpoint. The size is
//! what the request composer uses for `content-length`; when it is unknown the
//! request falls back to chunked transfer.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::error_handling::TransportError;

/// A readable body with a reported size.
pub struct BodySource {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    size: Option<u64>,
    origin: String,
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySource")
            .field("origin", &self.origin)
            .field("size", &self.size)
            .finish()
    }
}

impl BodySource {
    /// Wraps an arbitrary reader.
    pub fn from_reader<R>(reader: R, size: Option<u64>, origin: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            size,
            origin: origin.into(),
        }
    }

    /// In-memory body, its size is always known.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes: Bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::from_reader(io::Cursor::new(bytes), Some(size), "memory")
    }

    /// Opens a body resource.
    ///
    /// # Arguments
    ///
    /// * `location` - `-` for stdin, an `http://` or `https://` URL, or a file path
    /// * `client` - HTTP client used for remote resources
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Body` if the file cannot be opened or the
    /// remote endpoint does not answer with a success status.
    pub async fn open(location: &str, client: &reqwest::Client) -> Result<Self, TransportError> {
        if location == "-" {
            return Ok(Self::from_reader(tokio::io::stdin(), None, "stdin"));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = client
                .get(location)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| TransportError::Body(format!("{location}: {e}")))?;
            let size = response.content_length();
            let stream = response.bytes_stream().map_err(io::Error::other);
            return Ok(Self::from_reader(StreamReader::new(stream), size, location));
        }

        let file = tokio::fs::File::open(location)
            .await
            .map_err(|e| TransportError::Body(format!("{location}: {e}")))?;
        let size = match file.metadata().await {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            _ => None,
        };
        Ok(Self::from_reader(file, size, location))
    }

    /// Size in bytes when it can be determined.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Where the body comes from, for trace output.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Consumes the source, returning its reader.
    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_from_bytes_reports_size() {
        let source = BodySource::from_bytes("hello");
        assert_eq!(source.size(), Some(5));
        let mut out = String::new();
        source.into_reader().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_open_file_reports_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{\"a\":1}").unwrap();
        let client = reqwest::Client::new();
        let source = BodySource::open(file.path().to_str().unwrap(), &client)
            .await
            .unwrap();
        assert_eq!(source.size(), Some(7));
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let client = reqwest::Client::new();
        let err = BodySource::open("/nonexistent/body.json", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Body(_)));
    }

    #[tokio::test]
    async fn test_stdin_has_unknown_size() {
        let client = reqwest::Client::new();
        let source = BodySource::open("-", &client).await.unwrap();
        assert_eq!(source.size(), None);
        assert_eq!(source.origin(), "stdin");
    }
}
