//! Clinic Bot Server - Main Entry Point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use clinic_bot_server::{
    api,
    auth::AuthService,
    cache::{create_redis_client, CacheStore, RedisStore},
    config::Config,
    conversation::ConversationStore,
    dedup::DedupStore,
    messaging::{MessagingGateway, WhatsAppClient},
    observability,
    ratelimit::{RateLimitConfig, RateLimiter},
    resilience::CircuitBreaker,
    scheduling::{self, SchedulingClient, SchedulingDirectory, SessionCache, SessionEndpoint},
    webhooks::Orchestrator,
    workflows::{default_registry, WorkflowContext},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    observability::init(config.is_production());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting Clinic Bot Server"
    );

    // Initialize Redis
    let redis = create_redis_client(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    let cache: Arc<dyn CacheStore> = Arc::new(RedisStore::new(redis));

    let http = scheduling::client::build_http_client(
        Duration::from_secs(config.http_connect_timeout_secs),
        Duration::from_secs(config.http_read_timeout_secs),
    )?;
    let retry = config.retry_policy();

    // Scheduling database
    let scheduling_breaker = Arc::new(CircuitBreaker::new("scheduling", config.breaker_config()));
    let issuer = SessionEndpoint::new(
        http.clone(),
        &config.fm_base_url,
        &config.fm_database,
        config.fm_username.clone(),
        config.fm_password.clone(),
        Duration::from_secs(config.fm_token_lifetime_secs),
    );
    let sessions = SessionCache::new(
        Arc::clone(&cache),
        Arc::new(issuer),
        retry.clone(),
        Duration::from_secs(config.fm_token_safety_margin_secs),
    );
    let scheduling: Arc<dyn SchedulingDirectory> = Arc::new(SchedulingClient::new(
        http.clone(),
        &config.fm_base_url,
        &config.fm_database,
        config.scheduling_schema.clone(),
        sessions,
        Arc::clone(&scheduling_breaker),
        retry.clone(),
    ));

    // Messaging gateway
    let whatsapp_breaker = Arc::new(CircuitBreaker::new("whatsapp", config.breaker_config()));
    let messaging: Arc<dyn MessagingGateway> = Arc::new(WhatsAppClient::new(
        http,
        &config.wsp_api_base_url,
        &config.wsp_api_version,
        &config.wsp_phone_id,
        config.wsp_token.clone(),
        Arc::clone(&whatsapp_breaker),
        retry,
    ));

    // Workflows
    let context = Arc::new(WorkflowContext {
        messaging: Arc::clone(&messaging),
        scheduling: Arc::clone(&scheduling),
        conversation: ConversationStore::new(
            Arc::clone(&cache),
            Duration::from_secs(config.conversation_ttl_secs),
        ),
        schema: config.scheduling_schema.clone(),
        timezone: config.clinic_timezone,
    });
    let registry = default_registry(context).context("invalid workflow registry")?;
    info!(roles = ?registry.roles(), "Workflows registered");

    let rl_config = RateLimitConfig::from_env();
    if !rl_config.enabled {
        info!("Rate limiting disabled by configuration");
    }

    let orchestrator = Orchestrator::new(
        DedupStore::new(Arc::clone(&cache), Duration::from_secs(config.dedup_ttl_secs)),
        RateLimiter::new(Arc::clone(&cache), rl_config),
        AuthService::new(
            Arc::clone(&cache),
            Arc::clone(&scheduling),
            Duration::from_secs(config.auth_cache_ttl_secs),
        ),
        Arc::new(registry),
        messaging,
        config.max_message_length,
    );

    // Build application state
    let bind_address = config.bind_address.clone();
    let state = api::AppState::new(
        orchestrator,
        config,
        cache,
        Arc::clone(&scheduling),
        vec![scheduling_breaker, whatsapp_breaker],
    );

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Err(e) = scheduling.close_session().await {
        warn!(error = %e, "Failed to close scheduling session");
    }

    info!("Server shutdown complete");

    Ok(())
}
