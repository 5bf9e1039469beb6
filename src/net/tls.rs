//! TLS termination with on-demand certificates.
//!
//! The ClientHello is read before any certificate is chosen, so issuance
//! can happen asynchronously inside the handshake:
//!
//! ```text
//! ClientHello
//!     → no SNI                          → reject
//!     → ALPN offers acme-tls/1          → validation cert, finish, close
//!     → SNI on allow-list               → issued cert, hand stream to HTTP
//!     → anything else                   → reject
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

use crate::acme::{AcmeError, CertManager, Issuer, ACME_TLS_ALPN};
use crate::observability::metrics;

/// Why a handshake was not completed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client sent no server name")]
    MissingServerName,

    #[error("no pending challenge for '{0}'")]
    NoPendingChallenge(String),

    #[error(transparent)]
    Certificate(#[from] AcmeError),

    #[error("handshake timed out")]
    Timeout,
}

/// Result of a completed handshake.
pub enum Accepted<IO> {
    /// Application traffic, ready for HTTP.
    Stream(TlsStream<IO>),
    /// A TLS-ALPN-01 validation request was answered; nothing more to serve.
    Challenge,
}

pub struct TlsAcceptor<I> {
    certs: Arc<CertManager<I>>,
    timeout: Duration,
}

impl<I> Clone for TlsAcceptor<I> {
    fn clone(&self) -> Self {
        Self {
            certs: Arc::clone(&self.certs),
            timeout: self.timeout,
        }
    }
}

impl<I: Issuer> TlsAcceptor<I> {
    pub fn new(certs: Arc<CertManager<I>>, timeout: Duration) -> Self {
        Self { certs, timeout }
    }

    /// Run the handshake, bounded by the configured timeout.
    ///
    /// On timeout only this handshake fails; a certificate order it started
    /// keeps running in the background.
    pub async fn accept<IO>(&self, io: IO) -> Result<Accepted<IO>, HandshakeError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let result = match tokio::time::timeout(self.timeout, self.handshake(io)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::Timeout),
        };

        metrics::record_handshake(match &result {
            Ok(Accepted::Stream(_)) => "success",
            Ok(Accepted::Challenge) => "challenge",
            Err(_) => "failure",
        });
        result
    }

    async fn handshake<IO>(&self, io: IO) -> Result<Accepted<IO>, HandshakeError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), io).await?;

        let (server_name, is_challenge) = {
            let hello = start.client_hello();
            let is_challenge = hello
                .alpn()
                .map(|mut protocols| protocols.any(|p| p == ACME_TLS_ALPN))
                .unwrap_or(false);
            (hello.server_name().map(str::to_string), is_challenge)
        };

        let host = server_name.ok_or(HandshakeError::MissingServerName)?;

        if is_challenge {
            let config = self
                .certs
                .challenge_config(&host)
                .ok_or_else(|| HandshakeError::NoPendingChallenge(host.clone()))?;
            start.into_stream(config).await?;
            tracing::info!(host = %host, "Answered TLS-ALPN-01 validation");
            return Ok(Accepted::Challenge);
        }

        let cert = self.certs.get_certificate(&host).await?;
        let stream = start.into_stream(cert.server_config()).await?;
        Ok(Accepted::Stream(stream))
    }
}
