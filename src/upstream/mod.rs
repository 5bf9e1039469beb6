//! Upstream API subsystem.
//!
//! # Data Flow
//! ```text
//! GET /api/random
//!     → client.rs (one GET with API key header, bounded by timeout)
//!     → item.rs (decode JSON array, take first element)
//!     → URL handed back to the HTTP layer
//! ```

pub mod client;
pub mod item;

pub use client::UpstreamClient;
pub use item::UpstreamItem;

use thiserror::Error;

/// Errors from the upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection, protocol or header error.
    #[error("upstream request failed: {0}")]
    Request(reqwest::Error),

    /// The call exceeded its deadline.
    #[error("upstream request timed out")]
    Timeout,

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),

    /// The body was not a JSON array of items.
    #[error("upstream body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// The array was empty.
    #[error("upstream returned no items")]
    Empty,

    /// The first item had no URL.
    #[error("upstream item has no url")]
    MissingUrl,
}

impl UpstreamError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Request(err)
        }
    }

    /// True when the body arrived but was unusable.
    pub fn is_bad_response(&self) -> bool {
        matches!(
            self,
            UpstreamError::Decode(_) | UpstreamError::Empty | UpstreamError::MissingUrl
        )
    }
}
