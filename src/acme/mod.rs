//! Automatic certificate management subsystem.
//!
//! # Data Flow
//! ```text
//! TLS ClientHello (SNI, ALPN)
//!     → ALPN acme-tls/1: challenge.rs answers with the validation certificate
//!     → otherwise: manager.rs
//!         → policy.rs (allow-list)
//!         → memory → cache.rs (disk) → issuer.rs (ACME order, TLS-ALPN-01)
//!         → certificate.rs (parsed chain + rustls ServerConfig)
//! ```
//!
//! # Design Decisions
//! - Issuance happens on demand, during the first handshake for a host
//! - Failures only fail the handshake that triggered them
//! - Validation traffic and application traffic share one port, told apart
//!   by ALPN

pub mod cache;
pub mod certificate;
pub mod challenge;
pub mod error;
pub mod issuer;
pub mod manager;
pub mod policy;

pub use cache::DirCache;
pub use certificate::IssuedCertificate;
pub use challenge::{ChallengeGuard, ChallengeStore, ACME_TLS_ALPN};
pub use error::{AcmeError, AcmeResult};
pub use issuer::{AcmeIssuer, Issuer};
pub use manager::CertManager;
pub use policy::HostPolicy;
