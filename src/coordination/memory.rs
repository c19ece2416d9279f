//! In-process coordination store backed by `DashMap`.
//!
//! Each operation holds the shard lock for its key, which gives the same
//! single-operation atomicity as the shared store. Expiry is evaluated lazily
//! on access using `tokio::time::Instant`, so paused-clock tests can advance TTLs.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::{CoordinationStore, CounterDecrement};
use crate::error::Result;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    entries: DashMap<String, StoredEntry>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, mostly useful for assertions
    pub fn live_key_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let fresh = StoredEntry {
            value: StoredValue::Text(value.to_string()),
            expires_at: Some(now + ttl),
        };

        let created = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };

        trace!(key = %key, created, "set_if_absent");
        Ok(created)
    }

    async fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Counter(value),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn decrement_counter(&self, key: &str) -> Result<CounterDecrement> {
        let now = Instant::now();
        let outcome = match self.entries.entry(key.to_string()) {
            Entry::Vacant(_) => CounterDecrement::Missing,
            Entry::Occupied(occupied) if occupied.get().is_expired(now) => {
                occupied.remove();
                CounterDecrement::Missing
            }
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                StoredValue::Counter(count) if *count > 0 => {
                    *count -= 1;
                    CounterDecrement::Decremented(*count)
                }
                StoredValue::Counter(_) => CounterDecrement::AtZero,
                // A non-numeric value is not a live counter
                StoredValue::Text(_) => CounterDecrement::Missing,
            },
        };
        Ok(outcome)
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>> {
        let now = Instant::now();
        Ok(self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                return None;
            }
            match &entry.value {
                StoredValue::Counter(count) => Some(*count),
                StoredValue::Text(text) => text.parse().ok(),
            }
        }))
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                return None;
            }
            Some(match &entry.value {
                StoredValue::Counter(count) => count.to_string(),
                StoredValue::Text(text) => text.clone(),
            })
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }
}
