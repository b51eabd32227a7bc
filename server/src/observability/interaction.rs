//! Interaction events.
//!
//! One structured log line per user-visible interaction, on the dedicated
//! `interaction` target so they can be routed apart from application logs.
//! Every event carries an `event` field naming it.

use std::time::Duration;

use tracing::{info, warn};

/// Maximum characters of message content written to the log.
pub const MAX_LOGGED_CONTENT: usize = 200;

/// Outcome of a staff directory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Success,
    Cached,
    NotFound,
    Error,
}

impl AuthStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cached => "cached",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

/// Truncate `content` to at most [`MAX_LOGGED_CONTENT`] characters.
pub fn truncate(content: &str) -> &str {
    match content.char_indices().nth(MAX_LOGGED_CONTENT) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

pub fn message_received(phone: &str, msg_type: &str, msg_id: &str, content: &str) {
    info!(
        target: "interaction",
        event = "message_received",
        phone,
        direction = "inbound",
        msg_type,
        msg_id,
        content = truncate(content),
    );
}

pub fn message_sent(phone: &str, msg_type: &str, template: Option<&str>, content: &str) {
    info!(
        target: "interaction",
        event = "message_sent",
        phone,
        direction = "outbound",
        msg_type,
        template,
        content = truncate(content),
    );
}

pub fn message_duplicate(phone: &str, msg_id: &str) {
    info!(target: "interaction", event = "message_duplicate", phone, msg_id);
}

pub fn button_click(phone: &str, user: &str, role: &str, button: &str) {
    info!(target: "interaction", event = "button_click", phone, user, role, button);
}

pub fn auth(phone: &str, status: AuthStatus, user: Option<&str>, role: Option<&str>) {
    info!(
        target: "interaction",
        event = "auth",
        phone,
        status = status.as_str(),
        user,
        role,
    );
}

/// An external call finished; `status` is "ok" or a fault kind name.
pub fn api_call(
    service: &str,
    operation: &str,
    duration: Duration,
    status: &str,
    detail: Option<&str>,
) {
    let duration_ms = duration.as_millis() as u64;
    if status == "ok" {
        info!(
            target: "interaction",
            event = "api_call",
            service,
            operation,
            duration_ms,
            status,
            detail
        );
    } else {
        warn!(
            target: "interaction",
            event = "api_call",
            service,
            operation,
            duration_ms,
            status,
            detail
        );
    }
}

pub fn rate_limit_exceeded(phone: &str, limit: u32) {
    warn!(target: "interaction", event = "rate_limit_exceeded", phone, limit);
}

pub fn unsupported_message(phone: &str, msg_type: &str) {
    info!(target: "interaction", event = "unsupported_message", phone, msg_type);
}

pub fn workflow_action(phone: &str, role: &str, action: &str, detail: Option<&str>) {
    info!(target: "interaction", event = "workflow_action", phone, role, action, detail);
}
