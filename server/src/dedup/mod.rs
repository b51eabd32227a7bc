//! Message Deduplication
//!
//! Remembers which inbound message ids were already processed so that a
//! redelivered webhook never triggers side effects twice.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheError, CacheStore};

/// Key prefix for processed-message markers.
const KEY_PREFIX: &str = "dedup:msg";

/// Default marker lifetime: one day, longer than the platform's redelivery window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Write-once marker store keyed by message id.
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DedupStore {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record `message_id` as processed.
    ///
    /// Returns `true` when the id had already been recorded by an earlier
    /// call. Check and write are one atomic set-if-absent, so of several
    /// concurrent deliveries of the same id exactly one observes `false`.
    pub async fn mark_and_check(&self, message_id: &str) -> Result<bool, CacheError> {
        let written = self
            .store
            .set_if_absent(&Self::key(message_id), "1", self.ttl)
            .await?;
        if !written {
            debug!(message_id, "Message already processed");
        }
        Ok(!written)
    }

    fn key(message_id: &str) -> String {
        format!("{KEY_PREFIX}:{message_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    #[tokio::test]
    async fn test_second_delivery_is_duplicate() {
        let dedup = DedupStore::new(Arc::new(MemoryStore::new()), DEFAULT_TTL);
        assert!(!dedup.mark_and_check("wamid.1").await.unwrap());
        assert!(dedup.mark_and_check("wamid.1").await.unwrap());
        assert!(!dedup.mark_and_check("wamid.2").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_expires() {
        let dedup = DedupStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(10));
        assert!(!dedup.mark_and_check("wamid.1").await.unwrap());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!dedup.mark_and_check("wamid.1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_single_first_seen() {
        let dedup = DedupStore::new(Arc::new(MemoryStore::new()), DEFAULT_TTL);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = dedup.clone();
                tokio::spawn(async move { dedup.mark_and_check("wamid.race").await.unwrap() })
            })
            .collect();

        let mut first_seen = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                first_seen += 1;
            }
        }
        assert_eq!(first_seen, 1);
    }
}
