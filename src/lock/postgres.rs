//! PostgreSQL-backed [`LockStore`].
//!
//! Expects a table
//! `pool_locks (lock_key TEXT PRIMARY KEY, token UUID NOT NULL, expires_at TIMESTAMPTZ NOT NULL)`.
//! Acquire is a single upsert that only overwrites an expired row; release
//! deletes only the row still carrying the caller's token.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{LockStore, LockToken};
use crate::error::GatewayError;

/// Lock rows in PostgreSQL, shared by every gateway instance.
#[derive(Debug, Clone)]
pub struct PostgresLockStore {
    pool: PgPool,
}

impl PostgresLockStore {
    /// Creates a lock store on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PostgresLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, GatewayError> {
        let token = LockToken::new();
        let acquired = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO pool_locks (lock_key, token, expires_at) \
             VALUES ($1, $2, now() + make_interval(secs => $3)) \
             ON CONFLICT (lock_key) DO UPDATE \
             SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at \
             WHERE pool_locks.expires_at <= now() \
             RETURNING token",
        )
        .bind(key)
        .bind(token.as_uuid())
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.map(LockToken::from_uuid))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM pool_locks WHERE lock_key = $1 AND token = $2")
            .bind(key)
            .bind(token.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
