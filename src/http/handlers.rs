//! Request dispatch.
//!
//! ```text
//! GET  /api/random   → upstream call → 200 "<url>\n"
//! GET  *             → 400 "400 Bad GET path\n"
//! POST /api/created  → 201 "201 Created\n"
//! POST *             → 400 "400 Bad API path\n"
//! *    *             → 400 "400 Bad Method\n"
//! ```

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::error::RelayError;
use crate::http::response::text;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Single entry point for every request.
pub async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = match dispatch(&state, &method, &path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    tracing::debug!(status = response.status().as_u16(), "Request handled");
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn dispatch(state: &AppState, method: &Method, path: &str) -> Result<Response, RelayError> {
    match *method {
        Method::GET => handle_get(state, path).await,
        Method::POST => handle_post(path),
        _ => Err(RelayError::BadMethod),
    }
}

async fn handle_get(state: &AppState, path: &str) -> Result<Response, RelayError> {
    match path {
        "/api/random" => {
            let item = state.upstream.random_item().await?;
            tracing::debug!(id = %item.id, url = %item.url, "Upstream item selected");
            Ok(text(StatusCode::OK, format!("{}\n", item.url)))
        }
        _ => Err(RelayError::BadGetPath),
    }
}

fn handle_post(path: &str) -> Result<Response, RelayError> {
    match path {
        "/api/created" => Ok(text(StatusCode::CREATED, "201 Created\n".to_string())),
        _ => Err(RelayError::BadApiPath),
    }
}
