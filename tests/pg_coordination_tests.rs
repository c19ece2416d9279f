//! PostgreSQL-backed coordination tests. Skipped unless DATABASE_URL is set.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use stagesync_core::coordination::{
    CoordinationStore, CounterDecrement, DistributedLock, PgCoordinationStore, SignalOutcome,
    StageBarrier,
};

async fn pg_store() -> Option<Arc<PgCoordinationStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL coordination test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");
    let store = PgCoordinationStore::new(pool);
    store.ensure_schema().await.expect("failed to create schema");
    Some(Arc::new(store))
}

/// Unique key per test so runs against a shared database don't collide
fn unique_key(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_lock_contention_and_release() {
    let Some(store) = pg_store().await else { return };
    let key = unique_key("sync_running");
    let lock = DistributedLock::new(store.clone());
    let ttl = Duration::from_secs(600);

    assert!(lock.acquire(&key, "run-a", ttl).await.unwrap());
    assert!(!lock.acquire(&key, "run-b", ttl).await.unwrap());
    assert_eq!(lock.holder(&key).await.unwrap().as_deref(), Some("run-a"));

    lock.release(&key).await;
    lock.release(&key).await;
    assert!(lock.acquire(&key, "run-b", ttl).await.unwrap());
    lock.release(&key).await;
}

#[tokio::test]
async fn test_expired_lock_is_reclaimed() {
    let Some(store) = pg_store().await else { return };
    let key = unique_key("sync_running");

    assert!(store
        .set_if_absent(&key, "crashed-run", Duration::from_millis(200))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(store.get_value(&key).await.unwrap(), None);
    assert!(store
        .set_if_absent(&key, "next-run", Duration::from_secs(60))
        .await
        .unwrap());
    assert_eq!(store.get_value(&key).await.unwrap().as_deref(), Some("next-run"));
    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn test_counter_floors_at_zero() {
    let Some(store) = pg_store().await else { return };
    let key = unique_key("core_tasks_remaining");

    store.set_counter(&key, 1).await.unwrap();
    assert_eq!(
        store.decrement_counter(&key).await.unwrap(),
        CounterDecrement::Decremented(0)
    );
    assert_eq!(
        store.decrement_counter(&key).await.unwrap(),
        CounterDecrement::AtZero
    );
    assert_eq!(store.get_counter(&key).await.unwrap(), Some(0));

    assert!(store.delete(&key).await.unwrap());
    assert_eq!(
        store.decrement_counter(&key).await.unwrap(),
        CounterDecrement::Missing
    );
}

#[tokio::test]
async fn test_concurrent_signals_reach_exactly_zero() {
    let Some(store) = pg_store().await else { return };
    let key = unique_key("core_tasks_remaining");
    let barrier = StageBarrier::new(store.clone());
    barrier.init(&key, 8).await.unwrap();

    let signals: Vec<_> = (0..12)
        .map(|_| {
            let barrier = barrier.clone();
            let key = key.clone();
            tokio::spawn(async move { barrier.signal(&key).await.unwrap() })
        })
        .collect();

    let mut decremented = 0;
    let mut already_zero = 0;
    for signal in signals {
        match signal.await.unwrap() {
            SignalOutcome::Remaining(_) => decremented += 1,
            SignalOutcome::AlreadyZero => already_zero += 1,
            SignalOutcome::Missing => panic!("counter vanished"),
        }
    }

    assert_eq!(decremented, 8);
    assert_eq!(already_zero, 4);
    assert_eq!(barrier.remaining(&key).await.unwrap(), Some(0));
    barrier.cleanup(&key).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_acquires_exactly_one_wins() {
    let Some(store) = pg_store().await else { return };
    let key = unique_key("sync_running");

    let attempts: Vec<_> = (0..10)
        .map(|i| {
            let lock = DistributedLock::new(store.clone());
            let key = key.clone();
            tokio::spawn(async move {
                lock.acquire(&key, &format!("run-{i}"), Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        if attempt.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    store.delete(&key).await.unwrap();
}
