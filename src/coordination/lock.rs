//! # Distributed Lock
//!
//! Non-blocking run lock on top of the coordination store's conditional set.
//! A failed acquire means another run is active and the trigger should be
//! skipped; it is never retried here.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::CoordinationStore;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Try to take `key` for `ttl`, storing `holder` as the sentinel value.
    ///
    /// Returns `Ok(false)` under contention. Store errors propagate.
    #[instrument(skip(self))]
    pub async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let acquired = self.store.set_if_absent(key, holder, ttl).await?;

        if acquired {
            info!(
                lock_key = %key,
                holder = %holder,
                ttl_seconds = ttl.as_secs(),
                "🔒 Sync lock acquired"
            );
        } else {
            debug!(lock_key = %key, "Sync lock already held");
        }

        Ok(acquired)
    }

    /// Delete `key` unconditionally. Failures are logged, never returned:
    /// the TTL reclaims the key eventually.
    #[instrument(skip(self))]
    pub async fn release(&self, key: &str) {
        match self.store.delete(key).await {
            Ok(true) => info!(lock_key = %key, "🔓 Sync lock released"),
            Ok(false) => warn!(lock_key = %key, "Sync lock was already gone at release"),
            Err(e) => error!(
                lock_key = %key,
                error = %e,
                "❌ Failed to release sync lock, relying on TTL expiry"
            ),
        }
    }

    /// Current holder of `key`, if any
    pub async fn holder(&self, key: &str) -> Result<Option<String>> {
        self.store.get_value(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(InMemoryCoordinationStore::new()))
    }

    #[tokio::test]
    async fn test_acquire_release_acquire() {
        let lock = lock();
        let ttl = Duration::from_secs(600);

        assert!(lock.acquire("sync_running", "run-a", ttl).await.unwrap());
        assert!(!lock.acquire("sync_running", "run-b", ttl).await.unwrap());

        lock.release("sync_running").await;

        assert!(lock.acquire("sync_running", "run-b", ttl).await.unwrap());
        assert_eq!(
            lock.holder("sync_running").await.unwrap().as_deref(),
            Some("run-b")
        );
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let lock = lock();
        lock.release("sync_running").await;
        lock.release("sync_running").await;
        assert!(lock
            .acquire("sync_running", "run-a", Duration::from_secs(1))
            .await
            .unwrap());
    }
}
