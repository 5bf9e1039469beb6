//! cat-relay
//!
//! An HTTPS front for a random-image API. Certificates are obtained from an
//! ACME CA the first time a client asks for an allowed host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS──▶ net::listener ─▶ net::tls ──▶ http::server ─▶ http::handlers
//!                                        │                              │
//!                                        ▼                              ▼
//!                                  acme::manager                 upstream::client
//!                                   │        │                          │
//!                                   ▼        ▼                          ▼
//!                           acme::cache  acme::issuer ──▶ ACME CA   image API
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use cat_relay::acme::{AcmeIssuer, CertManager};
use cat_relay::config::loader::{load_config, ConfigError};
use cat_relay::config::validation::{validate_config, validate_plain_config};
use cat_relay::config::{RelayConfig, LETS_ENCRYPT_STAGING};
use cat_relay::lifecycle::{wait_for_signal, Shutdown};
use cat_relay::net::{Listener, TlsAcceptor};
use cat_relay::observability::{logging, metrics};
use cat_relay::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "cat-relay", version, about = "HTTPS relay for a random-image API")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides listener.bind_address
    #[arg(long)]
    addr: Option<String>,

    /// Upstream API key, overrides upstream.api_key
    #[arg(long, env = "CAT_RELAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Allowed hostname for certificates (repeatable)
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Certificate cache directory
    #[arg(long)]
    cache_dir: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(long)]
    acme_staging: bool,

    /// Serve plain HTTP instead of TLS
    #[arg(long)]
    insecure_http: bool,
}

impl Cli {
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(addr) = &self.addr {
            config.listener.bind_address = addr.clone();
        }
        if let Some(token) = &self.token {
            config.upstream.api_key = token.clone();
        }
        if !self.domains.is_empty() {
            config.acme.allowed_hosts = self.domains.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.acme.cache_dir = dir.clone();
        }
        if self.acme_staging {
            config.acme.directory_url = LETS_ENCRYPT_STAGING.to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability);
    tracing::info!("cat-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let validated = if cli.insecure_http {
        validate_plain_config(&config)
    } else {
        validate_config(&config)
    };
    validated.map_err(ConfigError::Validation)?;

    if config.upstream.api_key.is_empty() {
        tracing::warn!("No upstream API key configured");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        allowed_hosts = ?config.acme.allowed_hosts,
        directory_url = %config.acme.directory_url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let listener = Listener::bind(&config.listener).await?;
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let acme = config.acme.clone();
    let handshake_timeout = Duration::from_secs(config.timeouts.handshake_secs);
    let server = RelayServer::new(config)?;

    if cli.insecure_http {
        tracing::warn!("Serving plain HTTP; certificates are not managed");
        server.run(listener, shutdown.subscribe()).await?;
    } else {
        let certs = Arc::new(CertManager::new(&acme, AcmeIssuer::new(&acme)));
        let acceptor = TlsAcceptor::new(certs, handshake_timeout);
        server.run_tls(listener, acceptor, shutdown.subscribe()).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
