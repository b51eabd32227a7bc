//! Reusable test helpers for integration tests.
//!
//! Provides `TestApp`, which wires the real orchestrator and router to an
//! in-memory cache store, a fake staff directory and a recording messaging
//! gateway, plus builders for signed webhook deliveries.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use chrono::NaiveDate;
use clinic_bot_server::api::{create_router, AppState};
use clinic_bot_server::auth::{AuthService, AuthenticatedUser};
use clinic_bot_server::cache::{CacheStore, MemoryStore};
use clinic_bot_server::config::Config;
use clinic_bot_server::conversation::ConversationStore;
use clinic_bot_server::dedup::DedupStore;
use clinic_bot_server::messaging::{MessagingError, MessagingGateway, TemplateMessage};
use clinic_bot_server::ratelimit::{RateLimitConfig, RateLimiter};
use clinic_bot_server::resilience::{BreakerOpen, CircuitBreaker, CircuitBreakerConfig};
use clinic_bot_server::scheduling::{Record, SchedulingDirectory, SchedulingError};
use clinic_bot_server::webhooks::signing::{sign_payload, SIGNATURE_HEADER};
use clinic_bot_server::webhooks::Orchestrator;
use clinic_bot_server::workflows::{default_registry, WorkflowContext};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const DOCTOR_PHONE: &str = "56911111111";
pub const MANAGER_PHONE: &str = "56933333333";
pub const UNKNOWN_ROLE_PHONE: &str = "56922222222";
pub const UNREGISTERED_PHONE: &str = "56999999999";

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { to: String, body: String },
    Template { to: String, name: String, header_params: Vec<String> },
}

/// Messaging gateway that records every send.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, phone: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { to, body } if to == phone => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn templates_to(&self, phone: &str) -> Vec<(String, Vec<String>)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Template {
                    to,
                    name,
                    header_params,
                } if to == phone => Some((name, header_params)),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` messages were sent, for spawned work.
    pub async fn wait_for(&self, count: usize) -> Vec<Sent> {
        for _ in 0..200 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} sent messages, got {:?}", self.sent());
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.into(),
            body: body.into(),
        });
        Ok(())
    }

    async fn send_template(
        &self,
        to: &str,
        template: &TemplateMessage,
    ) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Template {
            to: to.into(),
            name: template.name.clone(),
            header_params: template.header_params.clone(),
        });
        Ok(())
    }
}

/// Staff directory backed by a map, with a fixed agenda for every date.
pub struct FakeDirectory {
    staff: HashMap<String, AuthenticatedUser>,
    agenda: Vec<Record>,
    agenda_dates: Mutex<Vec<NaiveDate>>,
    staff_lookups: AtomicUsize,
    down: AtomicBool,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        let staff = [
            staff(DOCTOR_PHONE, "Dra. Soto", "doctor"),
            staff(MANAGER_PHONE, "Luis Rojas", "Gerencia "),
            staff(UNKNOWN_ROLE_PHONE, "Pedro Díaz", "desconocido"),
        ]
        .into_iter()
        .map(|user| (user.phone.clone(), user))
        .collect();

        Self {
            staff,
            agenda: vec![appointment("09:30:00", "Carla", "Muñoz", "Control")],
            agenda_dates: Mutex::new(Vec::new()),
            staff_lookups: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        }
    }
}

impl FakeDirectory {
    pub fn agenda_dates(&self) -> Vec<NaiveDate> {
        self.agenda_dates.lock().unwrap().clone()
    }

    pub fn staff_lookups(&self) -> usize {
        self.staff_lookups.load(Ordering::SeqCst)
    }

    /// Fail every later call as if the scheduling breaker were open.
    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SchedulingError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SchedulingError::CircuitOpen(BreakerOpen {
                name: "scheduling".into(),
                retry_in: Duration::from_secs(30),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulingDirectory for FakeDirectory {
    async fn find_staff_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AuthenticatedUser>, SchedulingError> {
        self.staff_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.staff.get(phone).cloned())
    }

    async fn agenda(
        &self,
        _user: &AuthenticatedUser,
        date: NaiveDate,
    ) -> Result<Vec<Record>, SchedulingError> {
        self.check()?;
        self.agenda_dates.lock().unwrap().push(date);
        Ok(self.agenda.clone())
    }

    async fn message_threads(
        &self,
        _user: &AuthenticatedUser,
    ) -> Result<Vec<Record>, SchedulingError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn check_session(&self) -> Result<(), SchedulingError> {
        self.check()
    }

    async fn close_session(&self) -> Result<(), SchedulingError> {
        Ok(())
    }
}

fn staff(phone: &str, name: &str, role: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        phone: phone.into(),
        external_id: format!("id-{phone}"),
        display_name: name.into(),
        role: role.into(),
    }
}

pub fn appointment(time: &str, name: &str, surname: &str, activity: &str) -> Record {
    let field_data = json!({
        "Hora": time,
        "Pacientes::NOMBRE": name,
        "Pacientes::APELLIDO PATERNO": surname,
        "Actividad": activity,
        "Tipo": "Normal",
    });
    Record {
        record_id: "1".into(),
        field_data: field_data.as_object().cloned().unwrap_or_default(),
    }
}

// ============================================================================
// Test application
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub config: Arc<Config>,
    pub gateway: Arc<RecordingGateway>,
    pub directory: Arc<FakeDirectory>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rate_limit(RateLimitConfig::default())
    }

    pub fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        Self::build(Config::default_for_test(), rate_limit)
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, RateLimitConfig::default())
    }

    fn build(config: Config, rate_limit: RateLimitConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache: Arc<dyn CacheStore> = store.clone();
        let gateway = Arc::new(RecordingGateway::default());
        let directory = Arc::new(FakeDirectory::default());

        let context = Arc::new(WorkflowContext {
            messaging: gateway.clone(),
            scheduling: directory.clone(),
            conversation: ConversationStore::new(
                Arc::clone(&cache),
                Duration::from_secs(config.conversation_ttl_secs),
            ),
            schema: config.scheduling_schema.clone(),
            timezone: config.clinic_timezone,
        });
        let registry = default_registry(context).expect("default registry");

        let orchestrator = Orchestrator::new(
            DedupStore::new(Arc::clone(&cache), Duration::from_secs(config.dedup_ttl_secs)),
            RateLimiter::new(Arc::clone(&cache), rate_limit),
            AuthService::new(
                Arc::clone(&cache),
                directory.clone(),
                Duration::from_secs(config.auth_cache_ttl_secs),
            ),
            Arc::new(registry),
            gateway.clone(),
            config.max_message_length,
        );

        let breaker = Arc::new(CircuitBreaker::new(
            "scheduling",
            CircuitBreakerConfig::new(5, Duration::from_secs(30)),
        ));
        let state = AppState::new(
            orchestrator,
            config,
            cache,
            directory.clone(),
            vec![breaker],
        );

        Self {
            router: create_router(state.clone()),
            config: Arc::clone(&state.config),
            state,
            gateway,
            directory,
            store,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.state.orchestrator
    }

    /// Create a request builder.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Webhook POST signed with the configured app secret.
    pub fn signed_webhook(&self, body: &Value) -> Request<Body> {
        let raw = serde_json::to_vec(body).unwrap();
        let signature = sign_payload(&self.config.wsp_app_secret, &raw);
        Self::request(Method::POST, "/webhook")
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(raw))
            .unwrap()
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

// ============================================================================
// Payload builders
// ============================================================================

/// Notification envelope carrying one message.
pub fn envelope(message: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [message],
                },
            }],
        }],
    })
}

pub fn text_message(from: &str, id: &str, body: &str) -> Value {
    json!({
        "from": from,
        "id": id,
        "timestamp": "1760000000",
        "type": "text",
        "text": {"body": body},
    })
}

pub fn button_message(from: &str, id: &str, title: &str) -> Value {
    json!({
        "from": from,
        "id": id,
        "timestamp": "1760000000",
        "type": "interactive",
        "interactive": {
            "type": "button_reply",
            "button_reply": {"id": "btn", "title": title},
        },
    })
}

pub fn status_callback() -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "field": "messages",
                "value": {
                    "statuses": [{"id": "wamid.S", "status": "delivered"}],
                },
            }],
        }],
    })
}

/// Parse a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

pub async fn body_to_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}
