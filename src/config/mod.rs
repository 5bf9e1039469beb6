//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → handed to server, upstream client and certificate manager
//! ```
//!
//! # Design Decisions
//! - Config is built once at startup; there is no global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::RelayConfig;
pub use schema::{AcmeConfig, ListenerConfig, ObservabilityConfig, TimeoutConfig, UpstreamConfig};
pub use schema::{LETS_ENCRYPT_PRODUCTION, LETS_ENCRYPT_STAGING};
