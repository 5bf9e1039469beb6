//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status
//! - `relay_request_duration_seconds` (histogram): handler latency
//! - `relay_upstream_requests_total` (counter): upstream calls by outcome
//! - `relay_upstream_duration_seconds` (histogram): upstream latency
//! - `relay_certificate_issuance_total` (counter): issuance attempts by outcome
//! - `relay_tls_handshakes_total` (counter): handshakes by outcome
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream(outcome: &'static str, start: Instant) {
    counter!("relay_upstream_requests_total", "outcome" => outcome).increment(1);
    histogram!("relay_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_issuance(outcome: &'static str) {
    counter!("relay_certificate_issuance_total", "outcome" => outcome).increment(1);
}

pub fn record_handshake(outcome: &'static str) {
    counter!("relay_tls_handshakes_total", "outcome" => outcome).increment(1);
}
