//! Observability
//!
//! Log subscriber setup and the structured interaction events emitted for
//! every inbound message, outbound reply and external call.

pub mod interaction;
pub mod tracing;

pub use self::tracing::init;
