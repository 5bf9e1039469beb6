//! Pending TLS-ALPN-01 challenges.
//!
//! While an order is being validated, the CA connects to port 443 with
//! SNI set to the host and ALPN `acme-tls/1`. Such handshakes are answered
//! with a self-signed certificate carrying the critical `acmeIdentifier`
//! extension (RFC 8737), registered here for the lifetime of the order.

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{CertificateParams, CustomExtension, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::acme::error::AcmeResult;

/// ALPN identifier reserved for TLS-ALPN-01 validation.
pub const ACME_TLS_ALPN: &[u8] = b"acme-tls/1";

#[derive(Debug, Clone, Default)]
pub struct ChallengeStore {
    pending: Arc<DashMap<String, Arc<ServerConfig>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the validation certificate for `host`.
    ///
    /// `key_auth_digest` is the SHA-256 digest of the key authorization.
    pub fn register(&self, host: &str, key_auth_digest: &[u8]) -> AcmeResult<()> {
        let mut params = CertificateParams::new(vec![host.to_string()])?;
        params.custom_extensions = vec![CustomExtension::new_acme_identifier(key_auth_digest)];

        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));

        // webpki rejects the critical acmeIdentifier extension, so the key
        // goes in through a resolver instead of with_single_cert.
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let signing_key = provider.key_provider.load_private_key(key_der)?;
        let certified = CertifiedKey::new(vec![cert.der().clone()], signing_key);

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(ValidationCert(Arc::new(certified))));
        config.alpn_protocols = vec![ACME_TLS_ALPN.to_vec()];
        self.pending.insert(host.to_string(), Arc::new(config));

        tracing::debug!(host, "TLS-ALPN-01 challenge registered");
        Ok(())
    }

    pub fn get(&self, host: &str) -> Option<Arc<ServerConfig>> {
        self.pending.get(host).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, host: &str) {
        if self.pending.remove(host).is_some() {
            tracing::debug!(host, "TLS-ALPN-01 challenge removed");
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes whatever challenge `host` has registered when dropped.
    pub fn guard<'a>(&'a self, host: &'a str) -> ChallengeGuard<'a> {
        ChallengeGuard { store: self, host }
    }
}

/// Clears a host's pending challenge on every exit path of an order.
pub struct ChallengeGuard<'a> {
    store: &'a ChallengeStore,
    host: &'a str,
}

impl Drop for ChallengeGuard<'_> {
    fn drop(&mut self) {
        self.store.remove(self.host);
    }
}

/// Always answers with the one validation certificate.
#[derive(Debug)]
struct ValidationCert(Arc<CertifiedKey>);

impl ResolvesServerCert for ValidationCert {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}
