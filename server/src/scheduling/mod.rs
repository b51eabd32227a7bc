//! Scheduling Database
//!
//! Client for the clinic's session-based scheduling database: staff
//! directory lookups, appointment listings and message threads.

pub mod client;
pub mod session;
pub mod types;

pub use client::{SchedulingClient, SessionEndpoint};
pub use session::{SessionCache, TokenIssuer};
pub use types::*;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::auth::AuthenticatedUser;
use crate::cache::CacheError;
use crate::resilience::{classify_status, classify_transport, BreakerOpen, Fault, FaultKind};

/// Scheduling database errors.
///
/// An empty result set is never an error; lookups return an empty list.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("scheduling request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("scheduling returned HTTP {status} (code {code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    /// The session token was rejected and must be refreshed.
    #[error("scheduling session token rejected")]
    AuthExpired,

    #[error("scheduling response malformed: {0}")]
    Decode(String),

    #[error(transparent)]
    CircuitOpen(#[from] BreakerOpen),

    #[error("session cache error: {0}")]
    Cache(#[from] CacheError),
}

impl Fault for SchedulingError {
    fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Transport(e) => classify_transport(e),
            // A 401 outside a query means bad credentials, not an expired session.
            Self::Status { status: 401, .. } => FaultKind::Rejected,
            Self::Status { status, .. } => classify_status(*status),
            Self::AuthExpired => FaultKind::AuthExpired,
            Self::Decode(_) => FaultKind::Decode,
            Self::CircuitOpen(_) => FaultKind::CircuitOpen,
            Self::Cache(e) => e.fault_kind(),
        }
    }
}

/// Lookups the workflows and the orchestrator need from the scheduling
/// database.
#[async_trait]
pub trait SchedulingDirectory: Send + Sync {
    /// Staff member registered with `phone`, if any.
    async fn find_staff_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AuthenticatedUser>, SchedulingError>;

    /// Appointments of `user` on `date`.
    async fn agenda(
        &self,
        user: &AuthenticatedUser,
        date: NaiveDate,
    ) -> Result<Vec<Record>, SchedulingError>;

    /// Message threads addressed to `user`.
    async fn message_threads(&self, user: &AuthenticatedUser)
        -> Result<Vec<Record>, SchedulingError>;

    /// Verify a session token can be obtained.
    async fn check_session(&self) -> Result<(), SchedulingError>;

    /// Release the current session, if one is cached.
    async fn close_session(&self) -> Result<(), SchedulingError>;
}
