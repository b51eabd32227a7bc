//! Scheduling Database HTTP Client
//!
//! Data-API style REST client: basic-auth session creation, bearer-token
//! `_find` queries and session release. Every query goes through the retry
//! policy wrapped around the dependency's circuit breaker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{
    FindQuery, Record, SchedulingDirectory, SchedulingError, SchedulingSchema, SessionCache,
    SessionToken, TokenIssuer,
};
use crate::auth::AuthenticatedUser;
use crate::observability::interaction;
use crate::resilience::{CircuitBreaker, Fault, RetryPolicy};

/// Service name used in logs and as the breaker name.
pub const SERVICE: &str = "scheduling";

/// Message code for "no records match the request".
const CODE_NO_RECORDS: &str = "401";

/// Message code for "invalid session token".
const CODE_INVALID_TOKEN: &str = "952";

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    messages: Vec<EnvelopeMessage>,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl Envelope {
    fn first_message(&self) -> (String, String) {
        self.messages
            .first()
            .map(|m| (m.code.clone(), m.message.clone()))
            .unwrap_or_default()
    }
}

/// Map a `_find` response to records.
///
/// "No records" is reported with its own message code, usually inside an
/// HTTP 500; it becomes an empty list. An invalid token, or a bare 401 without
/// that code, means the session expired.
fn interpret_find(status: u16, body: &str) -> Result<Vec<Record>, SchedulingError> {
    if (200..300).contains(&status) {
        let envelope: Envelope = if body.trim().is_empty() {
            Envelope::default()
        } else {
            serde_json::from_str(body).map_err(|e| SchedulingError::Decode(e.to_string()))?
        };
        return match envelope.response.get("data") {
            Some(data) => serde_json::from_value(data.clone())
                .map_err(|e| SchedulingError::Decode(e.to_string())),
            None => Ok(Vec::new()),
        };
    }

    // Error pages from a proxy in front of the database are not JSON.
    let envelope: Envelope = serde_json::from_str(body).unwrap_or_default();
    let (code, message) = envelope.first_message();

    if code == CODE_NO_RECORDS {
        return Ok(Vec::new());
    }
    if code == CODE_INVALID_TOKEN || status == 401 {
        return Err(SchedulingError::AuthExpired);
    }

    Err(SchedulingError::Status {
        status,
        code,
        message,
    })
}

/// Build the shared HTTP client with per-call timeouts.
pub fn build_http_client(
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// Session endpoint of the scheduling database.
#[derive(Clone)]
pub struct SessionEndpoint {
    http: reqwest::Client,
    sessions_url: String,
    username: String,
    password: String,
    token_lifetime: Duration,
}

impl SessionEndpoint {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        database: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            http,
            sessions_url: format!(
                "{}/fmi/data/v1/databases/{database}/sessions",
                base_url.trim_end_matches('/')
            ),
            username: username.into(),
            password: password.into(),
            token_lifetime,
        }
    }
}

#[async_trait]
impl TokenIssuer for SessionEndpoint {
    async fn issue(&self) -> Result<SessionToken, SchedulingError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .http
                .post(&self.sessions_url)
                .basic_auth(&self.username, Some(&self.password))
                .json(&json!({}))
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;

            let envelope: Envelope = serde_json::from_str(&body).unwrap_or_default();
            if !(200..300).contains(&status) {
                let (code, message) = envelope.first_message();
                return Err(SchedulingError::Status {
                    status,
                    code,
                    message,
                });
            }

            let token = envelope
                .response
                .get("token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| SchedulingError::Decode("session response without token".into()))?;

            Ok(SessionToken {
                value: token.to_string(),
                expires_at: Utc::now()
                    + chrono::Duration::from_std(self.token_lifetime)
                        .unwrap_or(chrono::Duration::zero()),
            })
        }
        .await;

        log_call("session", started, &result);
        result
    }

    async fn revoke(&self, token: &str) -> Result<(), SchedulingError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .http
                .delete(format!("{}/{token}", self.sessions_url))
                .send()
                .await?;
            let status = response.status().as_u16();
            if (200..300).contains(&status) {
                Ok(())
            } else {
                Err(SchedulingError::Status {
                    status,
                    code: String::new(),
                    message: "session release failed".into(),
                })
            }
        }
        .await;

        log_call("session.close", started, &result);
        result
    }
}

/// Scheduling database client.
#[derive(Clone)]
pub struct SchedulingClient {
    http: reqwest::Client,
    layouts_url: String,
    schema: SchedulingSchema,
    sessions: SessionCache,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl SchedulingClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        database: &str,
        schema: SchedulingSchema,
        sessions: SessionCache,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            layouts_url: format!(
                "{}/fmi/data/v1/databases/{database}/layouts",
                base_url.trim_end_matches('/')
            ),
            schema,
            sessions,
            breaker,
            retry,
        }
    }

    /// Run a find query against `layout`.
    ///
    /// A rejected session is refreshed and the query retried exactly once.
    #[instrument(skip(self, query))]
    pub async fn find(
        &self,
        layout: &str,
        query: &FindQuery,
    ) -> Result<Vec<Record>, SchedulingError> {
        let token = self.sessions.get_token(false).await?;
        match self.find_resilient(layout, query, &token).await {
            Err(SchedulingError::AuthExpired) => {
                warn!(layout, "Session token rejected, refreshing");
                if let Err(e) = self.sessions.invalidate().await {
                    warn!(error = %e, "Failed to invalidate session token");
                }
                let token = self.sessions.get_token(true).await?;
                self.find_resilient(layout, query, &token).await
            }
            other => other,
        }
    }

    async fn find_resilient(
        &self,
        layout: &str,
        query: &FindQuery,
        token: &str,
    ) -> Result<Vec<Record>, SchedulingError> {
        self.retry
            .run("scheduling.find", move || {
                self.breaker
                    .call(move || self.find_once(layout, query, token))
            })
            .await
    }

    async fn find_once(
        &self,
        layout: &str,
        query: &FindQuery,
        token: &str,
    ) -> Result<Vec<Record>, SchedulingError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .http
                .post(format!("{}/{layout}/_find", self.layouts_url))
                .bearer_auth(token)
                .json(&query.to_body())
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            interpret_find(status, &body)
        }
        .await;

        log_call("find", started, &result);
        result
    }
}

#[async_trait]
impl SchedulingDirectory for SchedulingClient {
    async fn find_staff_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AuthenticatedUser>, SchedulingError> {
        let schema = &self.schema;
        let query = FindQuery::new().matching([(
            schema.staff_phone_field.clone(),
            schema.phone_value(phone),
        )]);
        let records = self.find(&schema.auth_layout, &query).await?;

        Ok(records.first().map(|record| AuthenticatedUser {
            phone: phone.to_string(),
            external_id: record
                .field_text(&schema.staff_id_field)
                .unwrap_or_else(|| record.record_id.clone()),
            display_name: record
                .field_text(&schema.staff_name_field)
                .unwrap_or_default(),
            role: record
                .field_text(&schema.staff_role_field)
                .unwrap_or_default(),
        }))
    }

    async fn agenda(
        &self,
        user: &AuthenticatedUser,
        date: NaiveDate,
    ) -> Result<Vec<Record>, SchedulingError> {
        let schema = &self.schema;
        let mut query = FindQuery::new().matching([
            (
                schema.agenda_phone_field.clone(),
                schema.phone_value(&user.phone),
            ),
            (
                schema.agenda_date_field.clone(),
                date.format(&schema.date_format).to_string(),
            ),
        ]);
        for omitted in &schema.agenda_omit_types {
            query = query.omitting(schema.agenda_type_field.clone(), omitted.clone());
        }
        self.find(&schema.agenda_layout, &query).await
    }

    async fn message_threads(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<Record>, SchedulingError> {
        let schema = &self.schema;
        let query = FindQuery::new().matching([(
            schema.messages_phone_field.clone(),
            schema.phone_value(&user.phone),
        )]);
        self.find(&schema.messages_layout, &query).await
    }

    async fn check_session(&self) -> Result<(), SchedulingError> {
        self.sessions.get_token(false).await.map(|_| ())
    }

    async fn close_session(&self) -> Result<(), SchedulingError> {
        self.sessions.close().await?;
        info!("Scheduling session released");
        Ok(())
    }
}

fn log_call<T>(operation: &str, started: Instant, result: &Result<T, SchedulingError>) {
    match result {
        Ok(_) => interaction::api_call(SERVICE, operation, started.elapsed(), "ok", None),
        Err(e) => interaction::api_call(
            SERVICE,
            operation,
            started.elapsed(),
            e.fault_kind().as_str(),
            Some(&e.to_string()),
        ),
    }
}
