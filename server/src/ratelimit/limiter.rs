//! Core rate limiter service on the shared cache store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheError, CacheStore};
use crate::ratelimit::RateLimitConfig;

/// Result of a sender rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the event may be processed
    pub allowed: bool,
    /// Maximum events allowed in the window
    pub limit: u32,
}

impl RateLimitResult {
    const fn bypass() -> Self {
        Self {
            allowed: true,
            limit: 0,
        }
    }
}

/// Sliding-window counter per key, backed by the cache store's atomic
/// increment.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Count one event for `key` and report whether it is within `limit`.
    ///
    /// The increment and the window start happen in one atomic store
    /// operation, so concurrent callers for the same key never both observe
    /// the last free slot.
    pub async fn allow(&self, key: &str, limit: u32, window: Duration) -> Result<bool, CacheError> {
        let count = self
            .store
            .incr_in_window(&self.build_key(key), window)
            .await?;
        Ok(count <= i64::from(limit))
    }

    /// Check the configured per-sender limit for a phone number.
    ///
    /// Store failures let the event through when `fail_open` is set.
    #[tracing::instrument(skip(self))]
    pub async fn check_sender(&self, phone: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::bypass();
        }

        if self.is_allowed_by_config(phone) {
            debug!(phone = %phone, "Sender in allowlist, bypassing rate limit");
            return RateLimitResult::bypass();
        }

        let limit = self.config.sender;
        let window = Duration::from_secs(limit.window_secs);
        let allowed = match self.allow(phone, limit.requests, window).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(error = %e, fail_open = self.config.fail_open, "Rate limit check failed");
                self.config.fail_open
            }
        };
        RateLimitResult {
            allowed,
            limit: limit.requests,
        }
    }

    /// Checks if the sender is in the allowlist configuration.
    pub fn is_allowed_by_config(&self, phone: &str) -> bool {
        self.config.allowlist.contains(phone)
    }

    /// Builds a cache key with the configured prefix.
    fn build_key(&self, identifier: &str) -> String {
        format!("{}:{}", self.config.key_prefix, identifier)
    }
}
