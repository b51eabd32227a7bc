//! Clinic Bot Server
//!
//! Messaging webhook front-end that lets clinic staff query the scheduling
//! database through role-specific conversational workflows.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod dedup;
pub mod formatters;
pub mod messaging;
pub mod observability;
pub mod ratelimit;
pub mod resilience;
pub mod scheduling;
pub mod webhooks;
pub mod workflows;
