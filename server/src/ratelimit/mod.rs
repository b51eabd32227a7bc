//! Per-sender rate limiting.
//!
//! Bounds how many inbound events one phone number may trigger per window,
//! using an atomic counter in the shared cache store.

pub mod config;
pub mod limiter;

pub use config::*;
pub use limiter::*;
