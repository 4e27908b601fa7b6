use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Transport-level failures while retrieving a feed document.
///
/// None of these are retried here; the feed is simply attempted again on its
/// next turn in the polling rotation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, unreadable body, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// HTTP client for feed documents.
///
/// Every request carries the same `User-Agent` and is bounded by one timeout
/// covering connect, headers and body.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Build a fetcher with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the TLS backend can't be initialised.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// GET `url` and return the raw body.
    ///
    /// The status code is not inspected: a 404 or 500 whose body happens to be
    /// a feed is still returned to the caller, and one that isn't will fail in
    /// the parser. Non-2xx responses are logged at `warn`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - DNS, connection, TLS or body read errors
    /// - [`FetchError::Timeout`] - the whole exchange exceeded the timeout
    /// - [`FetchError::ResponseTooLarge`] - body over 10MB
    /// - [`FetchError::IncompleteResponse`] - body shorter than Content-Length
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.timeout, self.fetch_unbounded(url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn fetch_unbounded(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                feed = %url,
                status = %status,
                "Non-success status, attempting to parse body anyway"
            );
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        tracing::debug!(feed = %url, bytes = bytes.len(), "Fetched feed");
        Ok(bytes)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
