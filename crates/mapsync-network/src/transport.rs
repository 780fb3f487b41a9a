//! Transport abstraction shared by the HTTP and filesystem backends

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use mapsync_types::Result;
use std::fmt;

/// Stream of body chunks; every item is either data or a transport error
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An opened remote resource
pub struct Payload {
    /// Resolved location the payload was opened from
    pub url: String,
    /// Size announced by the transport, when known
    pub content_length: Option<u64>,
    /// Body chunks in order
    pub stream: ByteStream,
}

impl Payload {
    /// Read the whole body into memory
    pub async fn collect(self) -> Result<Vec<u8>> {
        let capacity = self.content_length.unwrap_or(0).min(16 * 1024 * 1024) as usize;
        self.stream
            .try_fold(Vec::with_capacity(capacity), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Retrieval of named resources from a repository
///
/// Failing to reach a resource, a non-success answer and a broken body are
/// all network errors; callers decide whether that is fatal.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a resource for streaming
    async fn open(&self, url: &str) -> Result<Payload>;

    /// Retrieve a text resource; invalid UTF-8 is replaced, not rejected
    async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.open(url).await?.collect().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
