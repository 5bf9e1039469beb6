//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::error_response;
use crate::upstream::UpstreamError;

/// Everything a single request can fail with. None of these are fatal to
/// the process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Bad Method")]
    BadMethod,

    #[error("Bad GET path")]
    BadGetPath,

    #[error("Bad API path")]
    BadApiPath,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadMethod | RelayError::BadGetPath | RelayError::BadApiPath => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short message for the response body. Upstream details stay in logs.
    fn client_message(&self) -> &'static str {
        match self {
            RelayError::BadMethod => "Bad Method",
            RelayError::BadGetPath => "Bad GET path",
            RelayError::BadApiPath => "Bad API path",
            RelayError::Upstream(UpstreamError::Timeout) => "Upstream timed out",
            RelayError::Upstream(e) if e.is_bad_response() => "Bad upstream response",
            RelayError::Upstream(_) => "Upstream request failed",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Upstream(UpstreamError::Timeout) => {
                tracing::warn!("Upstream call timed out");
            }
            RelayError::Upstream(e) => {
                tracing::error!(error = %e, "Upstream call failed");
            }
            _ => {}
        }
        error_response(self.status(), self.client_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::BadMethod.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::BadApiPath.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::from(UpstreamError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RelayError::from(UpstreamError::Empty).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(RelayError::BadGetPath.client_message(), "Bad GET path");
        assert_eq!(
            RelayError::from(UpstreamError::MissingUrl).client_message(),
            "Bad upstream response"
        );
        assert_eq!(
            RelayError::from(UpstreamError::Status(reqwest::StatusCode::UNAUTHORIZED))
                .client_message(),
            "Upstream request failed"
        );
    }
}
