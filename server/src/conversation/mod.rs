//! Conversation State
//!
//! Per-sender position in a multi-turn dialogue, kept in the shared cache
//! store so any instance can continue a conversation started on another.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::{CacheError, CacheStore};

/// Key prefix for conversation state.
const KEY_PREFIX: &str = "workflow:state";

/// Default idle time before a dialogue is abandoned.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// Current step of a sender's dialogue and its step-scoped data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ConversationState {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            data: Map::new(),
        }
    }

    pub fn is_step(&self, step: &str) -> bool {
        self.step == step
    }
}

/// Conversation state keyed by sender phone.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Current state for `phone`, if any.
    ///
    /// A value that is not a JSON object is read as a bare step name; an
    /// unreadable value is discarded and reads as no state.
    pub async fn get(&self, phone: &str) -> Result<Option<ConversationState>, CacheError> {
        let key = Self::key(phone);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        if let Ok(state) = serde_json::from_str::<ConversationState>(&raw) {
            return Ok(Some(state));
        }

        let step = raw.trim();
        if !step.is_empty() && !step.starts_with(['{', '[', '"']) {
            return Ok(Some(ConversationState::new(step)));
        }

        warn!(phone, "Discarding unreadable conversation state");
        self.store.delete(&key).await?;
        Ok(None)
    }

    /// Replace the state for `phone`, restarting its expiry.
    pub async fn set(
        &self,
        phone: &str,
        step: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<(), CacheError> {
        let state = ConversationState {
            step: step.to_string(),
            data: data.unwrap_or_default(),
        };
        let raw = serde_json::to_string(&state)?;
        self.store.set(&Self::key(phone), &raw, Some(self.ttl)).await?;
        debug!(phone, step, "Conversation state set");
        Ok(())
    }

    /// Drop any state for `phone`.
    pub async fn clear(&self, phone: &str) -> Result<(), CacheError> {
        self.store.delete(&Self::key(phone)).await?;
        debug!(phone, "Conversation state cleared");
        Ok(())
    }

    fn key(phone: &str) -> String {
        format!("{KEY_PREFIX}:{phone}")
    }
}
