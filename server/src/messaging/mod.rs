//! Messaging Gateway
//!
//! Outbound replies to staff through the messaging platform's REST API.

pub mod whatsapp;

pub use whatsapp::WhatsAppClient;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::resilience::{classify_status, classify_transport, BreakerOpen, Fault, FaultKind};

/// Messaging gateway errors.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("messaging request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("messaging gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    CircuitOpen(#[from] BreakerOpen),
}

impl Fault for MessagingError {
    fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Transport(e) => classify_transport(e),
            Self::Status { status, .. } => classify_status(*status),
            Self::CircuitOpen(_) => FaultKind::CircuitOpen,
        }
    }
}

/// A pre-approved message template with positional header parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMessage {
    pub name: String,
    pub language: String,
    pub header_params: Vec<String>,
}

impl TemplateMessage {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            header_params: Vec::new(),
        }
    }

    pub fn with_header_param(mut self, value: impl Into<String>) -> Self {
        self.header_params.push(value.into());
        self
    }

    /// Wire representation of the `template` object.
    pub fn to_payload(&self) -> Value {
        let mut template = json!({
            "name": self.name,
            "language": {"code": self.language},
        });
        if !self.header_params.is_empty() {
            let parameters: Vec<Value> = self
                .header_params
                .iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect();
            template["components"] = json!([{"type": "header", "parameters": parameters}]);
        }
        template
    }
}

/// Sends replies to a phone number.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), MessagingError>;

    async fn send_template(&self, to: &str, template: &TemplateMessage)
        -> Result<(), MessagingError>;
}
