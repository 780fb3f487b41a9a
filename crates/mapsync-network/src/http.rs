//! HTTP(S) transport backed by reqwest

use crate::transport::{Payload, Transport};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mapsync_config::NetworkConfig;
use mapsync_types::{Error, Result, RetryConfig, TimeoutConfig};
use tracing::{debug, warn};

/// Settings shared by every transport of a run
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect, read and request timeouts
    pub timeouts: TimeoutConfig,
    /// Backoff for transient failures
    pub retry: RetryConfig,
    /// Value of the User-Agent header
    pub user_agent: String,
    /// Read size used by the filesystem transport
    pub chunk_size: usize,
}

impl TransportConfig {
    /// `mapsync/<version> (<os> <arch>)`
    pub fn default_user_agent() -> String {
        format!(
            "mapsync/{} ({} {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    /// Build from the network section and the configured chunk size
    pub fn from_network(network: &NetworkConfig, chunk_size: usize) -> Self {
        Self {
            timeouts: network.timeouts.clone(),
            retry: network.retry.clone(),
            user_agent: network
                .user_agent
                .clone()
                .unwrap_or_else(Self::default_user_agent),
            chunk_size,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_network(&NetworkConfig::default(), mapsync_types::ChunkSize::DEFAULT)
    }
}

/// Transport for `http://` and `https://` repositories
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryConfig,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Create a transport with its own connection pool
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeouts.connect_timeout)
            .read_timeout(config.timeouts.read_timeout);
        if let Some(timeout) = config.timeouts.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::network(format!("Failed to build HTTP client: {}", e)))?;

        let timeout_secs = config
            .timeouts
            .request_timeout
            .unwrap_or(config.timeouts.read_timeout)
            .as_secs();

        Ok(Self {
            client,
            retry: config.retry.clone(),
            timeout_secs,
        })
    }

    async fn send_once(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::status(status.as_u16(), url));
        }
        Ok(response)
    }

    async fn send_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.send_once(url).await {
                Ok(response) => return Ok(response),
                Err(e) if e.should_retry() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "Request to {} failed ({}), retrying in {:?} ({}/{})",
                        url,
                        e,
                        delay,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn map_error(&self, url: &str, error: &reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout {
                seconds: self.timeout_secs,
            }
        } else {
            Error::network(format!("{}: {}", url, error))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<Payload> {
        debug!("GET {}", url);
        let response = self.send_with_retry(url).await?;
        let content_length = response.content_length();
        debug!("Content-Length: {:?}", content_length);

        let timeout_secs = self.timeout_secs;
        let source = url.to_string();
        let stream = response
            .bytes_stream()
            .map_err(move |e| {
                if e.is_timeout() {
                    Error::Timeout {
                        seconds: timeout_secs,
                    }
                } else {
                    Error::network(format!("Failed to read body of {}: {}", source, e))
                }
            })
            .boxed();

        Ok(Payload {
            url: url.to_string(),
            content_length,
            stream,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
