//! Session token cache.
//!
//! The scheduling database hands out short-lived session tokens. One token is
//! shared by every request through the cache store and refreshed lazily.
//! Concurrent refreshes are tolerated: the database treats re-authentication
//! as idempotent, so at worst a few redundant tokens are issued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{SchedulingError, SessionToken};
use crate::cache::CacheStore;
use crate::resilience::RetryPolicy;

/// Cache key holding the shared session token.
pub const TOKEN_KEY: &str = "scheduling:session:token";

/// Issues and revokes session tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<SessionToken, SchedulingError>;

    async fn revoke(&self, token: &str) -> Result<(), SchedulingError>;
}

/// Shared session token, cached with a safety margin before its real expiry.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    issuer: Arc<dyn TokenIssuer>,
    retry: RetryPolicy,
    safety_margin: Duration,
}

impl SessionCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        issuer: Arc<dyn TokenIssuer>,
        retry: RetryPolicy,
        safety_margin: Duration,
    ) -> Self {
        Self {
            store,
            issuer,
            retry,
            safety_margin,
        }
    }

    /// Cached token, or a freshly issued one.
    ///
    /// `force_refresh` skips the cache; used once after a query is rejected
    /// for an expired session. Cache store failures only cost a refresh.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String, SchedulingError> {
        if !force_refresh {
            match self.store.get(TOKEN_KEY).await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Session cache read failed, issuing new token"),
            }
        }

        let token = self
            .retry
            .run("scheduling.session", || self.issuer.issue())
            .await?;

        match self.cache_ttl(&token) {
            Some(ttl) => {
                if let Err(e) = self.store.set(TOKEN_KEY, &token.value, Some(ttl)).await {
                    warn!(error = %e, "Failed to cache session token");
                }
                debug!(ttl_secs = ttl.as_secs(), "Session token cached");
            }
            None => warn!("Session token lifetime shorter than safety margin, not cached"),
        }

        Ok(token.value)
    }

    /// Forget the cached token.
    pub async fn invalidate(&self) -> Result<(), SchedulingError> {
        self.store.delete(TOKEN_KEY).await?;
        info!("Session token invalidated");
        Ok(())
    }

    /// Revoke and forget the cached token, if any.
    pub async fn close(&self) -> Result<(), SchedulingError> {
        let Some(token) = self.store.get(TOKEN_KEY).await? else {
            return Ok(());
        };
        self.store.delete(TOKEN_KEY).await?;
        self.issuer.revoke(&token).await?;
        info!("Session closed");
        Ok(())
    }

    /// Time the token may be reused: its remaining lifetime minus the margin.
    fn cache_ttl(&self, token: &SessionToken) -> Option<Duration> {
        let remaining = (token.expires_at - Utc::now()).to_std().ok()?;
        remaining
            .checked_sub(self.safety_margin)
            .filter(|ttl| *ttl >= Duration::from_secs(1))
    }
}
