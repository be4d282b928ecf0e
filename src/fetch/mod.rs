//! Single-shot page fetching with bounded timeouts.
//!
//! This module provides the [`PageFetcher`] seam used by both the change
//! detection pipeline and the crawler, and [`HttpClient`], its reqwest-backed
//! implementation.
//!
//! # Behavior
//!
//! - One outbound GET per call; the fetcher never retries (see [`RetryPolicy`])
//! - Any HTTP status is a successful fetch; callers decide what non-2xx means
//! - Connect and whole-request timeouts bound a single slow page
//! - Bodies are streamed and capped at [`MAX_BODY_BYTES`]
//!
//! # Example
//!
//! ```no_run
//! use sitewatch_core::fetch::{HttpClient, PageFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let page = client.fetch("https://example.com/").await?;
//! println!("{} -> HTTP {}", page.url, page.status);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod retry;

use async_trait::async_trait;

pub use client::HttpClient;
pub use constants::{CONNECT_TIMEOUT_SECS, MAX_BODY_BYTES, REQUEST_TIMEOUT_SECS};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

/// Raw result of one GET request.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was requested.
    pub url: String,
    /// The URL after redirects.
    pub final_url: String,
    /// HTTP status code of the final response.
    pub status: u16,
    /// Response body decoded as UTF-8 (lossy).
    pub body: String,
    /// Whether the body was cut at [`MAX_BODY_BYTES`].
    pub truncated: bool,
}

impl FetchedPage {
    /// Returns true for 2xx responses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-2xx page into [`FetchError::HttpStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::HttpStatus`] when the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::http_status(self.url, self.status))
        }
    }
}

/// Something that can GET a page.
///
/// Implementations must be cheap to share across tasks (`Send + Sync`) and
/// must not retry internally.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs a single GET of `url`.
    ///
    /// # Errors
    ///
    /// Returns a network-level [`FetchError`] when no response was received.
    /// A response with any status code is returned as `Ok`.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}
