//! Webhook HTTP Handlers
//!
//! `GET /webhook` answers the platform's subscription challenge;
//! `POST /webhook` verifies, acknowledges and processes deliveries.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::signing::{verify_signature, SIGNATURE_HEADER};
use super::types::{WebhookAck, WebhookEnvelope, WebhookError};
use crate::api::AppState;

/// Subscription challenge parameters.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echo the challenge when the verify token matches.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<impl IntoResponse, WebhookError> {
    let token_ok = params.verify_token.as_deref() == Some(state.config.wsp_verify_token.as_str());
    match params.challenge {
        Some(challenge) if token_ok => {
            info!(mode = ?params.mode, "Webhook subscription verified");
            Ok(([(header::CONTENT_TYPE, "text/plain")], challenge))
        }
        _ => Err(WebhookError::VerifyToken),
    }
}

/// Receive a delivery.
///
/// The signature is checked against the raw body before anything is parsed.
/// Work the workflow deferred is spawned after the outcome is known, so the
/// acknowledgment never waits on it.
#[instrument(skip_all, fields(delivery_id = %Uuid::now_v7()))]
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    verify_signature(&state.config.wsp_app_secret, &body, signature)?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)?;
    let (outcome, deferred) = state.orchestrator.handle(envelope).await;

    if !deferred.is_empty() {
        debug!(tasks = ?deferred.names(), "Spawning deferred work");
        deferred.spawn();
    }

    Ok(Json(WebhookAck {
        status: outcome.status().to_string(),
        reason: outcome.reason().map(str::to_string),
    }))
}
