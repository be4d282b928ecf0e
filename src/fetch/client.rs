//! HTTP client wrapper for fetching pages.
//!
//! This module provides the `HttpClient` struct which performs bounded-timeout
//! GET requests and streams the body into memory.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_BODY_BYTES, REQUEST_TIMEOUT_SECS};
use super::error::FetchError;
use super::{FetchedPage, PageFetcher};
use crate::user_agent;

/// HTTP client for fetching pages.
///
/// This client is designed to be created once and reused for every fetch in a
/// run, taking advantage of connection pooling. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 10 seconds
    /// - Request timeout: 30 seconds
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(request_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        debug!(status, final_url = %final_url, "response received");

        let (bytes, truncated) = read_capped_body(response, url).await?;
        if truncated {
            warn!(url = %url, limit = MAX_BODY_BYTES, "response body truncated");
        }

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            truncated,
        })
    }
}

/// Streams the response body, stopping at [`MAX_BODY_BYTES`].
async fn read_capped_body(
    response: reqwest::Response,
    url: &str,
) -> Result<(Vec<u8>, bool), FetchError> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::body(url, e))?;
        let remaining = MAX_BODY_BYTES.saturating_sub(buffer.len());
        if chunk.len() > remaining {
            buffer.extend_from_slice(&chunk[..remaining]);
            return Ok((buffer, true));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok((buffer, false))
}
