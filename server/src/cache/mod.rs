//! Shared Cache Store
//!
//! Key-value store abstraction backing the session token cache, the sender
//! rate limiter, message deduplication and conversation state. All
//! cross-request atomicity comes from the store's own primitives.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::{create_redis_client, RedisStore};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::{Fault, FaultKind};

/// Cache store errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be reached or rejected the command.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be (de)serialized.
    #[error("cache value malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<fred::error::Error> for CacheError {
    fn from(e: fred::error::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl Fault for CacheError {
    fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Unavailable(_) => FaultKind::Storage,
            Self::Malformed(_) => FaultKind::Decode,
        }
    }
}

/// Network-accessible key-value store with TTLs and atomic primitives.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value; expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increment the counter at `key` and return the new value.
    ///
    /// The first increment of a window sets the key to expire after `window`.
    async fn incr_in_window(&self, key: &str, window: Duration) -> Result<i64, CacheError>;

    /// Atomically store `value` only if `key` is absent.
    ///
    /// Returns `true` when this call wrote the value.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, CacheError>;

    /// Verify connectivity.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value.
pub async fn set_json<T: serde::Serialize + Sync>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

/// TTLs are stored with second granularity; never round down to zero.
pub(crate) fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}
