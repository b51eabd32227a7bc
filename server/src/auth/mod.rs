//! Staff Authentication
//!
//! Resolves a sender phone to a staff member of the clinic. A sender that
//! is not in the staff directory is unauthenticated; the role of an
//! authenticated user is free-form and only checked against the workflow
//! registry.

pub mod service;

pub use service::{AuthService, DEFAULT_CACHE_TTL};

use serde::{Deserialize, Serialize};

/// A staff member identified by their phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub phone: String,
    /// Primary key in the scheduling database
    pub external_id: String,
    pub display_name: String,
    pub role: String,
}
