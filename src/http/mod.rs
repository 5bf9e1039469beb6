//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS stream (or plain TCP)
//!     → server.rs (hyper connection, Axum router, middleware)
//!     → request.rs (request ID, tracing span)
//!     → handlers.rs (method/path dispatch, upstream call)
//!     → error.rs / response.rs (status + plain-text body)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use error::RelayError;
pub use request::X_REQUEST_ID;
pub use server::{AppState, RelayServer};
