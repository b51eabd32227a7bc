//! Webhook Orchestrator
//!
//! Drives one inbound message through
//! dedup -> rate limit -> authentication -> role dispatch -> reply.
//! Every stage may end the event early with an [`WebhookOutcome`]; none of
//! them turns into a transport error, since the platform redelivers anything
//! that is not acknowledged.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, instrument, warn};

use super::types::{InboundEvent, InboundMessage, WebhookEnvelope};
use crate::auth::AuthService;
use crate::dedup::DedupStore;
use crate::messaging::MessagingGateway;
use crate::observability::interaction;
use crate::ratelimit::RateLimiter;
use crate::resilience::Fault;
use crate::workflows::{DeferredTasks, RoleRegistry, SERVICE_UNAVAILABLE_REPLY};

/// Reply when handling failed for a reason other than an unavailable dependency.
pub const GENERIC_ERROR_REPLY: &str =
    "Lo siento, ocurrió un problema procesando tu solicitud. Intenta nuevamente en unos minutos.";

/// Reply to message types no workflow understands.
pub const UNSUPPORTED_REPLY: &str =
    "Por ahora solo puedo procesar mensajes de texto y botones. 🙏";

fn role_not_configured_reply(role: &str) -> String {
    format!(
        "Tu perfil ({}) aún no tiene funciones configuradas. Contacta al administrador.",
        role.trim()
    )
}

fn message_too_long_reply(max: usize) -> String {
    format!("Tu mensaje es demasiado largo. El máximo es de {max} caracteres.")
}

/// Terminal state of one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Handed to the sender's workflow
    Dispatched,
    /// Notification without a message, e.g. a delivery status
    NoMessage,
    /// Message id already processed
    Duplicate,
    RateLimited,
    /// Sender is not in the staff directory; no reply is sent
    Unauthenticated,
    /// Sender's role has no workflow; told so
    RoleNotConfigured,
    /// Message type not handled; told so
    Unsupported,
    MessageTooLong,
    /// Deduplication could not be checked; dropped rather than risk a repeat
    DedupUnavailable,
    /// A dependency failed; an apology was sent if possible
    Degraded,
}

impl WebhookOutcome {
    pub const fn status(self) -> &'static str {
        match self {
            Self::Dispatched
            | Self::RoleNotConfigured
            | Self::Unsupported
            | Self::MessageTooLong => "processed",
            Self::NoMessage | Self::Duplicate | Self::RateLimited | Self::Unauthenticated => {
                "ignored"
            }
            Self::DedupUnavailable | Self::Degraded => "degraded",
        }
    }

    pub const fn reason(self) -> Option<&'static str> {
        match self {
            Self::Dispatched => None,
            Self::NoMessage => Some("no_message"),
            Self::Duplicate => Some("duplicate"),
            Self::RateLimited => Some("rate_limited"),
            Self::Unauthenticated => Some("unauthorized"),
            Self::RoleNotConfigured => Some("role_not_configured"),
            Self::Unsupported => Some("unsupported_message_type"),
            Self::MessageTooLong => Some("message_too_long"),
            Self::DedupUnavailable => Some("dedup_unavailable"),
            Self::Degraded => Some("degraded"),
        }
    }
}

/// Entry point for inbound events.
pub struct Orchestrator {
    dedup: DedupStore,
    rate_limiter: RateLimiter,
    auth: AuthService,
    registry: Arc<RoleRegistry>,
    messaging: Arc<dyn MessagingGateway>,
    max_message_length: usize,
}

impl Orchestrator {
    pub fn new(
        dedup: DedupStore,
        rate_limiter: RateLimiter,
        auth: AuthService,
        registry: Arc<RoleRegistry>,
        messaging: Arc<dyn MessagingGateway>,
        max_message_length: usize,
    ) -> Self {
        Self {
            dedup,
            rate_limiter,
            auth,
            registry,
            messaging,
            max_message_length,
        }
    }

    /// Handle a verified notification.
    ///
    /// Returns the outcome together with the work the workflow deferred; the
    /// caller runs it once the acknowledgment is on its way.
    pub async fn handle(&self, envelope: WebhookEnvelope) -> (WebhookOutcome, DeferredTasks) {
        let mut deferred = DeferredTasks::new();
        let outcome = match envelope.into_first_message() {
            Some(message) => self.handle_message(&message, &mut deferred).await,
            None => WebhookOutcome::NoMessage,
        };
        (outcome, deferred)
    }

    #[instrument(skip_all, fields(phone = %message.from, msg_id = %message.id))]
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        deferred: &mut DeferredTasks,
    ) -> WebhookOutcome {
        let phone = message.from.as_str();
        let event = message.event();
        interaction::message_received(phone, &message.kind, &message.id, event.content());

        match self.dedup.mark_and_check(&message.id).await {
            Ok(false) => {}
            Ok(true) => {
                interaction::message_duplicate(phone, &message.id);
                return WebhookOutcome::Duplicate;
            }
            Err(e) => {
                error!(error = %e, "Deduplication store unavailable, dropping event");
                return WebhookOutcome::DedupUnavailable;
            }
        }

        let rate = self.rate_limiter.check_sender(phone).await;
        if !rate.allowed {
            interaction::rate_limit_exceeded(phone, rate.limit);
            return WebhookOutcome::RateLimited;
        }

        let user = match self.auth.get_user_by_phone(phone).await {
            Ok(Some(user)) => user,
            Ok(None) => return WebhookOutcome::Unauthenticated,
            Err(e) => {
                error!(error = %e, fault = e.fault_kind().as_str(), "Staff lookup failed");
                self.reply(phone, SERVICE_UNAVAILABLE_REPLY).await;
                return WebhookOutcome::Degraded;
            }
        };

        let Some(workflow) = self.registry.resolve(&user.role) else {
            warn!(role = %user.role, "No workflow configured for role");
            self.reply(phone, &role_not_configured_reply(&user.role)).await;
            return WebhookOutcome::RoleNotConfigured;
        };

        let result = match &event {
            InboundEvent::Text { body } if body.chars().count() > self.max_message_length => {
                self.reply(phone, &message_too_long_reply(self.max_message_length))
                    .await;
                return WebhookOutcome::MessageTooLong;
            }
            InboundEvent::Unsupported { kind } => {
                interaction::unsupported_message(phone, kind);
                self.reply(phone, UNSUPPORTED_REPLY).await;
                return WebhookOutcome::Unsupported;
            }
            InboundEvent::Text { body } => workflow.handle_text(&user, phone, body, deferred).await,
            InboundEvent::Button { label } => {
                interaction::button_click(phone, &user.display_name, &user.role, label);
                workflow.handle_button(&user, phone, label, deferred).await
            }
        };

        match result {
            Ok(()) => WebhookOutcome::Dispatched,
            Err(e) => {
                error!(
                    role = workflow.role(),
                    fault = e.fault_kind().as_str(),
                    error = %e,
                    "Workflow failed"
                );
                let apology = if e.is_unavailable() {
                    SERVICE_UNAVAILABLE_REPLY
                } else {
                    GENERIC_ERROR_REPLY
                };
                self.reply(phone, apology).await;
                WebhookOutcome::Degraded
            }
        }
    }

    /// Best-effort reply; a failure is logged and otherwise swallowed.
    async fn reply(&self, phone: &str, body: &str) {
        if let Err(e) = self.messaging.send_text(phone, body).await {
            error!(error = %e, "Failed to send reply");
        }
    }
}
