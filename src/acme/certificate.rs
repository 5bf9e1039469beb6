//! Issued certificate material.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use x509_parser::prelude::*;

use crate::acme::error::{AcmeError, AcmeResult};

/// ALPN identifier offered for application traffic.
pub const HTTP11_ALPN: &[u8] = b"http/1.1";

/// A certificate chain with its private key, ready to serve.
///
/// The PEM bundle (key first, then chain) is kept verbatim so it can be
/// written back to the cache unchanged.
#[derive(Debug)]
pub struct IssuedCertificate {
    chain: Vec<CertificateDer<'static>>,
    not_after: SystemTime,
    pem: String,
    server_config: Arc<ServerConfig>,
}

impl IssuedCertificate {
    /// Parse a PEM bundle holding one private key and a certificate chain.
    pub fn from_pem(pem: &str) -> AcmeResult<Self> {
        let chain = rustls_pemfile::certs(&mut pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AcmeError::InvalidCertificate(format!("bad certificate PEM: {e}")))?;
        let leaf = chain
            .first()
            .ok_or_else(|| AcmeError::InvalidCertificate("no certificate in bundle".into()))?;
        let not_after = leaf_not_after(leaf)?;

        let key = rustls_pemfile::private_key(&mut pem.as_bytes())
            .map_err(|e| AcmeError::InvalidCertificate(format!("bad key PEM: {e}")))?
            .ok_or_else(|| AcmeError::InvalidCertificate("no private key in bundle".into()))?;

        let server_config = build_server_config(chain.clone(), key, &[HTTP11_ALPN])?;

        Ok(Self {
            chain,
            not_after,
            pem: pem.to_string(),
            server_config: Arc::new(server_config),
        })
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// TLS configuration serving this certificate with `http/1.1` ALPN.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.not_after
    }

    /// True once the certificate is inside the renewal window.
    pub fn needs_renewal(&self, renew_before: Duration) -> bool {
        match SystemTime::now().checked_add(renew_before) {
            Some(threshold) => threshold >= self.not_after,
            None => true,
        }
    }
}

/// Build a server-side TLS configuration for one certificate.
fn build_server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    alpn: &[&[u8]],
) -> Result<ServerConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

fn leaf_not_after(leaf: &CertificateDer<'_>) -> AcmeResult<SystemTime> {
    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| AcmeError::InvalidCertificate(format!("X.509 parse failed: {e}")))?;
    let secs = cert.validity().not_after.timestamp();
    Ok(UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64))
}
