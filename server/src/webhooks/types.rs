//! Webhook Types
//!
//! Inbound notification envelope of the messaging platform and the
//! acknowledgment returned for it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signing::SignatureError;

/// Notification envelope: entries of changes, each possibly carrying messages.
/// Status callbacks arrive in the same envelope without messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

impl WebhookEnvelope {
    /// The message this notification carries, if any.
    pub fn into_first_message(self) -> Option<InboundMessage> {
        self.entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.messages)
            .next()
    }
}

/// One inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Sender phone
    pub from: String,
    /// Platform message id, unique per message
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
    #[serde(default)]
    pub button: Option<TemplateButton>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Reply to an interactive message.
#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub button_reply: Option<ButtonReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReply {
    #[serde(default)]
    pub id: String,
    pub title: String,
}

/// Quick-reply button of a template message.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateButton {
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

/// What the sender did, independent of the wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text { body: String },
    Button { label: String },
    Unsupported { kind: String },
}

impl InboundEvent {
    /// Text logged for the event.
    pub fn content(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Button { label } => label,
            Self::Unsupported { .. } => "",
        }
    }
}

impl InboundMessage {
    pub fn event(&self) -> InboundEvent {
        match self.kind.as_str() {
            "text" => match &self.text {
                Some(text) => InboundEvent::Text {
                    body: text.body.clone(),
                },
                None => self.unsupported(),
            },
            "interactive" => match self.interactive.as_ref().and_then(|i| i.button_reply.as_ref()) {
                Some(reply) => InboundEvent::Button {
                    label: reply.title.clone(),
                },
                None => self.unsupported(),
            },
            "button" => match &self.button {
                Some(button) => InboundEvent::Button {
                    label: button.text.clone(),
                },
                None => self.unsupported(),
            },
            _ => self.unsupported(),
        }
    }

    fn unsupported(&self) -> InboundEvent {
        InboundEvent::Unsupported {
            kind: self.kind.clone(),
        }
    }
}

/// Body of the acknowledgment returned for every accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Webhook request rejections.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Invalid verification token")]
    VerifyToken,
}

impl WebhookError {
    const fn code(&self) -> &'static str {
        match self {
            Self::Signature(_) => "invalid_signature",
            Self::Payload(_) => "invalid_payload",
            Self::VerifyToken => "invalid_verify_token",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Webhook request rejected");
        let body = Json(serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (StatusCode::FORBIDDEN, body).into_response()
    }
}
