//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, connection IDs)
//!     → tls.rs (ClientHello inspection, certificate selection, handshake)
//!     → Hand off to HTTP layer
//! ```

pub mod listener;
pub mod tls;

pub use listener::{ConnectionId, ConnectionPermit, Listener, ListenerError};
pub use tls::{Accepted, HandshakeError, TlsAcceptor};
