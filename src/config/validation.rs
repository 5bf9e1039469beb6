//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. Every problem is
//! reported, not just the first one.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,

    #[error("acme.allowed_hosts must name at least one host")]
    NoAllowedHosts,

    #[error("acme.allowed_hosts entry '{0}' is not a valid hostname")]
    AllowedHost(String),

    #[error("acme.directory_url '{0}' is not a valid URL")]
    DirectoryUrl(String),

    #[error("acme.renew_before_days must be greater than zero")]
    RenewWindow,

    #[error("upstream.url '{0}' is not a valid http(s) URL")]
    UpstreamUrl(String),

    #[error("upstream.api_key_header must not be empty")]
    ApiKeyHeader,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Validate a configuration for TLS serving.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = common_errors(config);

    if config.acme.allowed_hosts.is_empty() {
        errors.push(ValidationError::NoAllowedHosts);
    }
    for host in &config.acme.allowed_hosts {
        if !is_valid_hostname(host) {
            errors.push(ValidationError::AllowedHost(host.clone()));
        }
    }
    if url::Url::parse(&config.acme.directory_url).is_err() {
        errors.push(ValidationError::DirectoryUrl(config.acme.directory_url.clone()));
    }
    if config.acme.renew_before_days == 0 {
        errors.push(ValidationError::RenewWindow);
    }
    if config.acme.order_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("acme.order_timeout_secs"));
    }
    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.handshake_secs"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a configuration for plain HTTP serving, where the ACME section
/// is unused.
pub fn validate_plain_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let errors = common_errors(config);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn common_errors(config: &RelayConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    match url::Url::parse(&config.upstream.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(ValidationError::UpstreamUrl(config.upstream.url.clone())),
    }
    if config.upstream.api_key_header.trim().is_empty() {
        errors.push(ValidationError::ApiKeyHeader);
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("upstream.timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs"));
    }

    errors
}

/// DNS name check: dot-separated labels of letters, digits and hyphens.
fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
