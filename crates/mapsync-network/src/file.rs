//! Filesystem transport for local mirrors
//!
//! Serves `file://` URLs and plain paths with the same contract as HTTP, so
//! a mirror on disk or a network share can stand in for the repository.

use crate::transport::{Payload, Transport};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mapsync_types::{Error, Result};
use std::io;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

/// Transport reading resources from the local filesystem
#[derive(Debug, Clone)]
pub struct FileTransport {
    chunk_size: usize,
}

impl FileTransport {
    /// Create a transport that yields chunks of `chunk_size` bytes
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Map a `file://` URL or a plain path to a filesystem path
    pub fn resolve_path(location: &str) -> Result<PathBuf> {
        if location.starts_with("file://") {
            let url = Url::parse(location)
                .map_err(|e| Error::config(format!("Invalid URL '{}': {}", location, e)))?;
            url.to_file_path()
                .map_err(|()| Error::config(format!("Not a local file URL: {}", location)))
        } else {
            Ok(PathBuf::from(location))
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn open(&self, url: &str) -> Result<Payload> {
        let path = Self::resolve_path(url)?;
        debug!("Opening {}", path.display());

        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::network(format!("{}: resource not found", url)),
            _ => Error::network(format!("{}: {}", url, e)),
        })?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::network(format!("{}: {}", url, e)))?;
        if metadata.is_dir() {
            return Err(Error::network(format!("{}: is a directory", url)));
        }

        let source = url.to_string();
        let stream = ReaderStream::with_capacity(file, self.chunk_size)
            .map_err(move |e| Error::network(format!("Failed to read {}: {}", source, e)))
            .boxed();

        Ok(Payload {
            url: url.to_string(),
            content_length: Some(metadata.len()),
            stream,
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_types::ErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_plain_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MAPS");
        std::fs::write(&path, "mapA abc123 def456\n").unwrap();

        let transport = FileTransport::new(4);
        let payload = transport.open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(payload.content_length, Some(19));
        let body = payload.collect().await.unwrap();
        assert_eq!(body, b"mapA abc123 def456\n");
    }

    #[tokio::test]
    async fn test_reads_file_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("UFO2MAP");
        std::fs::write(&path, "ufo2map version 2.3\n").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let text = FileTransport::new(1024)
            .get_text(url.as_str())
            .await
            .unwrap();
        assert_eq!(text, "ufo2map version 2.3\n");
    }

    #[tokio::test]
    async fn test_missing_resource_is_network_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nothing.gz");
        let err = FileTransport::new(1024)
            .open(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = FileTransport::new(1024)
            .open(dir.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
