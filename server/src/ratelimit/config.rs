//! Rate limiting configuration.

use std::collections::HashSet;

/// Configuration for the sender rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Prefix for cache keys (e.g., "ratelimit")
    pub key_prefix: String,
    /// Whether to allow events when the cache store is unavailable
    pub fail_open: bool,
    /// Sender phones that bypass rate limiting
    pub allowlist: HashSet<String>,
    /// Per-sender limit
    pub sender: LimitConfig,
}

/// Configuration for a single rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum events allowed in the window
    pub requests: u32,
    /// Window duration in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "ratelimit".to_string(),
            fail_open: true,
            allowlist: HashSet::new(),
            sender: LimitConfig {
                requests: 30,
                window_secs: 60,
            },
        }
    }
}

impl RateLimitConfig {
    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RATE_LIMIT_ENABLED`: Enable/disable rate limiting (default: true)
    /// - `RATE_LIMIT_PREFIX`: Cache key prefix (default: "ratelimit")
    /// - `RATE_LIMIT_FAIL_OPEN`: Allow events when the store is unavailable (default: true)
    /// - `RATE_LIMIT_ALLOWLIST`: Comma-separated sender phones that bypass the limit
    /// - `RATE_LIMIT_MAX`: Events per window per sender (default: 30)
    /// - `RATE_LIMIT_WINDOW`: Window length in seconds (default: 60)
    /// - `RATE_LIMIT_SENDER`: Both at once as "requests,window_secs"
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RATE_LIMIT_ENABLED") {
            config.enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_PREFIX") {
            config.key_prefix = val;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_FAIL_OPEN") {
            config.fail_open = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_ALLOWLIST") {
            config.allowlist = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(requests) = std::env::var("RATE_LIMIT_MAX")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.sender.requests = requests;
        }
        if let Some(window_secs) = std::env::var("RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.sender.window_secs = window_secs;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_SENDER") {
            if let Some(limit) = parse_limit_config(&val) {
                config.sender = limit;
            }
        }

        config
    }
}

/// Parses a limit config from "requests,window_secs" format.
fn parse_limit_config(val: &str) -> Option<LimitConfig> {
    let parts: Vec<&str> = val.split(',').collect();
    match parts.as_slice() {
        [requests, window_secs] => Some(LimitConfig {
            requests: requests.trim().parse().ok()?,
            window_secs: window_secs.trim().parse().ok()?,
        }),
        _ => None,
    }
}
