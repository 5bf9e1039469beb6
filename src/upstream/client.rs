//! Outbound HTTP client for the image search endpoint.
//!
//! # Responsibilities
//! - Issue one GET per call with the API key header
//! - Bound every call with the configured timeout
//! - Return the raw body; decoding is the caller's business
//!
//! # Design Decisions
//! - No retries and no caching: every call hits the upstream
//! - Non-success status codes are errors
//! - Dropping the returned future cancels the in-flight request

use bytes::Bytes;
use std::time::{Duration, Instant};

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::upstream::{UpstreamError, UpstreamItem};

/// Client for the single configured upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    api_key_header: String,
    api_key: String,
}

impl UpstreamClient {
    /// Build a client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cat-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Request)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key_header: config.api_key_header.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// GET `url` with one extra header and return the body bytes.
    pub async fn fetch(
        &self,
        url: &str,
        header_name: &str,
        header_value: &str,
    ) -> Result<Bytes, UpstreamError> {
        let start = Instant::now();
        let result = self.send(url, header_name, header_value).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(UpstreamError::Timeout) => "timeout",
            Err(UpstreamError::Status(_)) => "status",
            Err(_) => "error",
        };
        metrics::record_upstream(outcome, start);

        result
    }

    async fn send(
        &self,
        url: &str,
        header_name: &str,
        header_value: &str,
    ) -> Result<Bytes, UpstreamError> {
        let response = self
            .client
            .get(url)
            .header(header_name, header_value)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        response.bytes().await.map_err(UpstreamError::from_reqwest)
    }

    /// Fetch a fresh item from the configured endpoint.
    pub async fn random_item(&self) -> Result<UpstreamItem, UpstreamError> {
        let body = self.fetch(&self.url, &self.api_key_header, &self.api_key).await?;
        tracing::debug!(bytes = body.len(), "Upstream body received");
        UpstreamItem::first_from_json(&body)
    }
}
