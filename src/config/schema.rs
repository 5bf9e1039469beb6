//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Let's Encrypt production directory.
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory.
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Automatic certificate provisioning.
    pub acme: AcmeConfig,

    /// The single upstream API.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:443").
    pub bind_address: String,

    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            // TLS-ALPN-01 validation only ever dials port 443.
            bind_address: "0.0.0.0:443".to_string(),
            max_connections: 10_000,
        }
    }
}

/// ACME certificate provisioning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcmeConfig {
    /// Hostnames a certificate may be requested for.
    pub allowed_hosts: Vec<String>,

    /// Directory holding issued certificates and the account key.
    pub cache_dir: String,

    /// ACME directory URL.
    pub directory_url: String,

    /// Account contacts (e.g., "mailto:ops@example.com").
    pub contact: Vec<String>,

    /// Renew a certificate this many days before it expires.
    pub renew_before_days: u64,

    /// Give up on a pending order after this many seconds.
    pub order_timeout_secs: u64,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            cache_dir: "./certs".to_string(),
            directory_url: LETS_ENCRYPT_PRODUCTION.to_string(),
            contact: Vec::new(),
            renew_before_days: 30,
            order_timeout_secs: 120,
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Image search endpoint.
    pub url: String,

    /// Header carrying the API key.
    pub api_key_header: String,

    /// API key value.
    pub api_key: String,

    /// Upstream call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://api.thecatapi.com/v1/images/search".to_string(),
            api_key_header: "x-api-key".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request deadline in seconds.
    pub request_secs: u64,

    /// TLS handshake deadline in seconds (includes on-demand issuance).
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            handshake_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:443");
        assert_eq!(config.upstream.api_key_header, "x-api-key");
        assert_eq!(config.acme.directory_url, LETS_ENCRYPT_PRODUCTION);
        assert!(config.acme.allowed_hosts.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config: RelayConfig = toml::from_str(
            r#"
            [acme]
            allowed_hosts = ["relay.example.com"]

            [upstream]
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.acme.allowed_hosts, vec!["relay.example.com"]);
        assert_eq!(config.acme.cache_dir, "./certs");
        assert_eq!(config.upstream.api_key, "secret");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.timeouts.handshake_secs, 10);
    }
}
