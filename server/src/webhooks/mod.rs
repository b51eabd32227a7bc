//! Inbound Messaging Webhook
//!
//! Signature verification, payload types, the HTTP handlers and the
//! orchestrator that turns one delivery into a workflow step.

pub mod handlers;
pub mod orchestrator;
pub mod signing;
pub mod types;

pub use orchestrator::{Orchestrator, WebhookOutcome};
