//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, extract::State, http::StatusCode, response::IntoResponse,
    routing::get, Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    cache::CacheStore,
    config::Config,
    resilience::{BreakerSnapshot, CircuitBreaker, CircuitState},
    scheduling::SchedulingDirectory,
    webhooks::{handlers, Orchestrator},
};

/// Largest webhook body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Inbound event pipeline
    pub orchestrator: Arc<Orchestrator>,
    /// Server configuration
    pub config: Arc<Config>,
    /// Shared cache store
    pub cache: Arc<dyn CacheStore>,
    /// Scheduling database, probed by readiness
    pub scheduling: Arc<dyn SchedulingDirectory>,
    /// Breakers reported on readiness
    pub breakers: Vec<Arc<CircuitBreaker>>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator,
        config: Config,
        cache: Arc<dyn CacheStore>,
        scheduling: Arc<dyn SchedulingDirectory>,
        breakers: Vec<Arc<CircuitBreaker>>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            cache,
            scheduling,
            breakers,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/webhook", get(handlers::verify).post(handlers::receive))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    version: &'static str,
}

/// Liveness: the process is up and serving.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub cache: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<CheckStatus>,
    pub breakers: Vec<BreakerSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: std::fmt::Display> From<Result<(), E>> for CheckStatus {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Readiness: the cache store answers and, when configured, a scheduling
/// session can be obtained. Open breakers are reported but do not fail the
/// check, since they recover on their own.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = CheckStatus::from(state.cache.ping().await);
    let scheduling = if state.config.readiness_check_scheduling {
        Some(CheckStatus::from(state.scheduling.check_session().await))
    } else {
        None
    };
    let breakers: Vec<BreakerSnapshot> = state.breakers.iter().map(|b| b.snapshot()).collect();

    let ready = cache.ok && scheduling.as_ref().is_none_or(|s| s.ok);
    if !ready {
        warn!(cache = ?cache.error, "Readiness check failed");
    }
    for breaker in breakers.iter().filter(|b| b.state != CircuitState::Closed) {
        warn!(breaker = %breaker.name, state = ?breaker.state, "Breaker not closed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" },
        cache,
        scheduling,
        breakers,
    };
    (status, Json(body))
}
