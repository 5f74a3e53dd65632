//! PostgreSQL event log.

use sqlx::PgPool;

use super::models::to_bigint;
use crate::domain::PoolEvent;
use crate::error::GatewayError;

/// Appends [`PoolEvent`]s to the `pool_events` table.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends an event to the event log and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] on database failure.
    pub async fn save_event(&self, event: &PoolEvent) -> Result<i64, GatewayError> {
        let payload = serde_json::to_value(event)?;
        let row = sqlx::query_scalar::<_, i64>(
            "INSERT INTO pool_events (pool_id, event_type, version, payload) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(event.pool_id().as_uuid())
        .bind(event.event_type_str())
        .bind(to_bigint(event.version())?)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
