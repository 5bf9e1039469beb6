//! Resilience helpers.
//!
//! The relay never retries client traffic. Backoff only paces polling of
//! pending ACME orders.

pub mod backoff;
