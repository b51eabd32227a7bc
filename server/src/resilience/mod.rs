//! Resilience Primitives
//!
//! Circuit breaker and retry policy shared by every client that talks to an
//! unreliable external dependency.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::*;
pub use retry::*;

use serde::Serialize;

/// Coarse classification of an error raised by an external call.
///
/// Breakers and retry policies are configured with sets of these kinds
/// instead of concrete error types, so the same policy can wrap the
/// scheduling database and the messaging gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Connection refused, reset, DNS failure.
    Network,
    /// Connect or read timeout.
    Timeout,
    /// 5xx-class response or throttling.
    Server,
    /// Session token rejected by the dependency.
    AuthExpired,
    /// 4xx-class response caused by the request itself.
    Rejected,
    /// Response body could not be understood.
    Decode,
    /// Call refused locally by an open circuit breaker.
    CircuitOpen,
    /// Shared cache store failure.
    Storage,
}

impl FaultKind {
    /// Kinds that indicate the dependency itself is unhealthy.
    pub const TRANSIENT: [Self; 3] = [Self::Network, Self::Timeout, Self::Server];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::AuthExpired => "auth_expired",
            Self::Rejected => "rejected",
            Self::Decode => "decode",
            Self::CircuitOpen => "circuit_open",
            Self::Storage => "storage",
        }
    }
}

/// Errors that can be classified for breaker and retry decisions.
pub trait Fault {
    fn fault_kind(&self) -> FaultKind;

    /// Whether the caller should present this as "service unavailable".
    fn is_unavailable(&self) -> bool {
        matches!(
            self.fault_kind(),
            FaultKind::Network | FaultKind::Timeout | FaultKind::Server | FaultKind::CircuitOpen
        )
    }
}

/// Classify a `reqwest` transport error.
pub fn classify_transport(error: &reqwest::Error) -> FaultKind {
    if error.is_timeout() {
        FaultKind::Timeout
    } else if error.is_decode() {
        FaultKind::Decode
    } else if let Some(status) = error.status() {
        classify_status(status.as_u16())
    } else {
        FaultKind::Network
    }
}

/// Classify an HTTP status returned by a dependency.
pub const fn classify_status(status: u16) -> FaultKind {
    match status {
        401 => FaultKind::AuthExpired,
        408 => FaultKind::Timeout,
        429 | 500..=599 => FaultKind::Server,
        _ => FaultKind::Rejected,
    }
}
