//! # PostgreSQL Coordination Store
//!
//! Fleet-wide coordination store on a single table. Conditional set uses
//! `INSERT ... ON CONFLICT DO UPDATE ... WHERE expires_at <= now()` so an expired
//! lock is reclaimed in the same statement that would otherwise fail. Counter
//! decrements lock the row for the duration of a short transaction.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use super::{CoordinationStore, CounterDecrement};
use crate::error::{Result, SyncError};

const TABLE_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS stagesync_coordination_keys (
        key TEXT PRIMARY KEY,
        value TEXT,
        counter BIGINT,
        expires_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

#[derive(Debug, Clone)]
pub struct PgCoordinationStore {
    pool: PgPool,
}

impl PgCoordinationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the coordination table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(TABLE_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("ensure_schema", e))?;
        info!("✅ Coordination store schema ready");
        Ok(())
    }
}

fn store_error(operation: &str, err: sqlx::Error) -> SyncError {
    error!(operation = %operation, error = %err, "❌ Coordination store operation failed");
    SyncError::store_unavailable(operation, err.to_string())
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CoordinationStore for PgCoordinationStore {
    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let query = r#"
            INSERT INTO stagesync_coordination_keys (key, value, counter, expires_at, updated_at)
            VALUES ($1, $2, NULL, now() + ($3::BIGINT * INTERVAL '1 millisecond'), now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                counter = NULL,
                expires_at = EXCLUDED.expires_at,
                updated_at = now()
            WHERE stagesync_coordination_keys.expires_at IS NOT NULL
              AND stagesync_coordination_keys.expires_at <= now()
            RETURNING key
        "#;

        let row: Option<(String,)> = sqlx::query_as(query)
            .bind(key)
            .bind(value)
            .bind(ttl_millis(ttl))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("set_if_absent", e))?;

        debug!(key = %key, created = row.is_some(), "Conditional set completed");
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        let query = r#"
            INSERT INTO stagesync_coordination_keys (key, value, counter, expires_at, updated_at)
            VALUES ($1, NULL, $2, NULL, now())
            ON CONFLICT (key) DO UPDATE
            SET value = NULL,
                counter = EXCLUDED.counter,
                expires_at = NULL,
                updated_at = now()
        "#;

        sqlx::query(query)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("set_counter", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn decrement_counter(&self, key: &str) -> Result<CounterDecrement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("decrement_counter", e))?;

        let current: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            SELECT counter FROM stagesync_coordination_keys
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
            FOR UPDATE
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("decrement_counter", e))?;

        let outcome = match current {
            None | Some((None,)) => CounterDecrement::Missing,
            Some((Some(count),)) if count <= 0 => CounterDecrement::AtZero,
            Some((Some(_),)) => {
                let (remaining,): (i64,) = sqlx::query_as(
                    r#"
                    UPDATE stagesync_coordination_keys
                    SET counter = counter - 1, updated_at = now()
                    WHERE key = $1
                    RETURNING counter
                    "#,
                )
                .bind(key)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| store_error("decrement_counter", e))?;
                CounterDecrement::Decremented(remaining)
            }
        };

        tx.commit()
            .await
            .map_err(|e| store_error("decrement_counter", e))?;
        Ok(outcome)
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>> {
        let row: Option<(Option<i64>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT counter, value FROM stagesync_coordination_keys
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_counter", e))?;

        Ok(row.and_then(|(counter, value)| {
            counter.or_else(|| value.and_then(|text| text.parse().ok()))
        }))
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT value, counter FROM stagesync_coordination_keys
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_value", e))?;

        Ok(row.and_then(|(value, counter)| value.or_else(|| counter.map(|c| c.to_string()))))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM stagesync_coordination_keys
            WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > now()) AS live
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("delete", e))?;

        Ok(match result {
            Some(row) => sqlx::Row::try_get::<bool, _>(&row, "live").unwrap_or(false),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_saturates() {
        assert_eq!(ttl_millis(Duration::from_secs(600)), 600_000);
        assert_eq!(ttl_millis(Duration::MAX), i64::MAX);
    }
}
