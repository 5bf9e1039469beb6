//! Plain-text responses.
//!
//! Every reply the relay produces itself is `text/plain`; errors use the
//! `<code> <message>\n` body format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A plain-text response.
pub fn text(status: StatusCode, body: String) -> Response {
    (status, body).into_response()
}

/// An error response with body `<code> <message>\n`.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    text(status, format!("{} {}\n", status.as_u16(), message))
}
