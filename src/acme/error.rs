//! Certificate subsystem errors.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while obtaining a certificate.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// The requested name is not on the allow-list.
    #[error("host '{0}' is not allowed")]
    HostNotAllowed(String),

    /// The certificate cache could not be read or written.
    #[error("certificate cache I/O failed: {0}")]
    Cache(#[from] std::io::Error),

    /// A cached or issued PEM bundle is unusable.
    #[error("invalid certificate material: {0}")]
    InvalidCertificate(String),

    /// The ACME server rejected a request.
    #[error("ACME protocol error: {0}")]
    Protocol(#[from] instant_acme::Error),

    /// The CA did not offer a TLS-ALPN-01 challenge.
    #[error("no tls-alpn-01 challenge offered for '{0}'")]
    NoChallenge(String),

    /// Validation or finalization failed at the CA.
    #[error("order for '{host}' failed: {reason}")]
    OrderFailed { host: String, reason: String },

    /// The order did not settle before the deadline.
    #[error("order for '{0}' timed out")]
    OrderTimeout(String),

    /// Key, CSR or challenge certificate generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(#[from] rcgen::Error),

    /// rustls rejected the certificate/key pair.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// Account credentials could not be (de)serialized.
    #[error("account credentials error: {0}")]
    Account(#[from] serde_json::Error),

    /// The shared issuance task failed; every waiter sees the same error.
    #[error(transparent)]
    Issuance(Arc<AcmeError>),

    /// The issuance task ended without reporting an outcome.
    #[error("issuance for '{0}' was aborted")]
    Aborted(String),
}

impl AcmeError {
    /// The underlying error, looking through `Issuance`.
    pub fn root(&self) -> &AcmeError {
        match self {
            AcmeError::Issuance(inner) => inner.root(),
            other => other,
        }
    }
}

/// Result type for certificate operations.
pub type AcmeResult<T> = Result<T, AcmeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcmeError::HostNotAllowed("evil.example".into());
        assert_eq!(err.to_string(), "host 'evil.example' is not allowed");

        let err = AcmeError::OrderFailed {
            host: "relay.example".into(),
            reason: "invalid".into(),
        };
        assert!(err.to_string().contains("relay.example"));
    }

    #[test]
    fn test_shared_error_is_transparent() {
        let err = AcmeError::Issuance(Arc::new(AcmeError::OrderTimeout("relay.example".into())));
        assert_eq!(err.to_string(), "order for 'relay.example' timed out");
        assert!(matches!(err.root(), AcmeError::OrderTimeout(_)));
    }
}
