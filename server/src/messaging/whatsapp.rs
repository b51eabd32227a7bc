//! WhatsApp Cloud API client.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{MessagingError, MessagingGateway, TemplateMessage};
use crate::observability::interaction;
use crate::resilience::{CircuitBreaker, Fault, RetryPolicy};

/// Service name used in logs and as the breaker name.
pub const SERVICE: &str = "whatsapp";

/// Longest text body the platform accepts in one message.
pub const MAX_TEXT_LEN: usize = 4096;

/// Maximum characters of an error response kept in the error.
const MAX_ERROR_BODY: usize = 512;

/// Split `text` into chunks of at most `limit` characters, preferring to
/// break after a newline.
pub fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some((hard_end, _)) = rest.char_indices().nth(limit) else {
            chunks.push(rest);
            break;
        };
        let end = rest[..hard_end]
            .rfind('\n')
            .map_or(hard_end, |idx| idx + 1);
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    chunks
}

/// Messaging gateway on the WhatsApp Cloud API.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl WhatsAppClient {
    pub fn new(
        http: reqwest::Client,
        api_base_url: &str,
        api_version: &str,
        phone_number_id: &str,
        access_token: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            messages_url: format!(
                "{}/{api_version}/{phone_number_id}/messages",
                api_base_url.trim_end_matches('/')
            ),
            access_token: access_token.into(),
            breaker,
            retry,
        }
    }

    async fn post(&self, payload: &Value) -> Result<(), MessagingError> {
        self.retry
            .run("whatsapp.send", move || {
                self.breaker.call(move || self.post_once(payload))
            })
            .await
    }

    async fn post_once(&self, payload: &Value) -> Result<(), MessagingError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .http
                .post(&self.messages_url)
                .bearer_auth(&self.access_token)
                .json(payload)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(MessagingError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            })
        }
        .await;

        match &result {
            Ok(()) => interaction::api_call(SERVICE, "send", started.elapsed(), "ok", None),
            Err(e) => interaction::api_call(
                SERVICE,
                "send",
                started.elapsed(),
                e.fault_kind().as_str(),
                Some(&e.to_string()),
            ),
        }
        result
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppClient {
    #[instrument(skip(self, body))]
    async fn send_text(&self, to: &str, body: &str) -> Result<(), MessagingError> {
        for chunk in split_message(body, MAX_TEXT_LEN) {
            let payload = json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": {"body": chunk},
            });
            self.post(&payload).await?;
            interaction::message_sent(to, "text", None, chunk);
        }
        Ok(())
    }

    #[instrument(skip(self, template), fields(template = %template.name))]
    async fn send_template(
        &self,
        to: &str,
        template: &TemplateMessage,
    ) -> Result<(), MessagingError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": template.to_payload(),
        });
        self.post(&payload).await?;
        interaction::message_sent(to, "template", Some(&template.name), "");
        Ok(())
    }
}
