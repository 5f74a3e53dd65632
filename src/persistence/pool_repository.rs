//! PostgreSQL-backed [`PoolRepository`].

use async_trait::async_trait;
use sqlx::PgPool;

use super::models::{PoolColumns, from_bigint, to_bigint};
use crate::domain::geo::BoundingBox;
use crate::domain::{GeoPoint, Load, PoolId, PoolRepository, PoolSummary, RidePool};
use crate::error::GatewayError;

/// Pools stored as JSONB documents with indexed search columns.
///
/// Writes are conditional on the `version` column, so two instances
/// racing past an expired lock cannot both commit.
#[derive(Debug, Clone)]
pub struct PostgresPoolRepository {
    pool: PgPool,
}

impl PostgresPoolRepository {
    /// Creates a repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stored_version(&self, id: PoolId) -> Result<Option<u64>, GatewayError> {
        let version =
            sqlx::query_scalar::<_, i64>("SELECT version FROM ride_pools WHERE pool_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        version.map(from_bigint).transpose()
    }

    async fn conflict(&self, id: PoolId, expected: u64) -> GatewayError {
        match self.stored_version(id).await {
            Ok(Some(found)) => GatewayError::ConcurrencyConflict {
                pool_id: *id.as_uuid(),
                expected,
                found,
            },
            Ok(None) => GatewayError::PoolNotFound(*id.as_uuid()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl PoolRepository for PostgresPoolRepository {
    async fn find_nearby(
        &self,
        point: GeoPoint,
        radius_km: f64,
        min_seats: u32,
        min_luggage: u32,
    ) -> Result<Vec<PoolSummary>, GatewayError> {
        let bbox = BoundingBox::around(&point, radius_km);
        let [(west_lo, west_hi), (east_lo, east_hi)] = bbox.lng_ranges();
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM ride_pools \
             WHERE status IN ('forming', 'matched') \
               AND free_seats >= $1 AND free_luggage >= $2 \
               AND origin_lat BETWEEN $3 AND $4 \
               AND (origin_lng BETWEEN $5 AND $6 OR origin_lng BETWEEN $7 AND $8) \
             ORDER BY pool_id",
        )
        .bind(i64::from(min_seats))
        .bind(i64::from(min_luggage))
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(west_lo)
        .bind(west_hi)
        .bind(east_lo)
        .bind(east_hi)
        .fetch_all(&self.pool)
        .await?;

        let need = Load::new(min_seats, min_luggage);
        let mut found = Vec::with_capacity(bodies.len());
        for body in bodies {
            let pool: RidePool = serde_json::from_value(body)?;
            // The box overshoots the circle at its corners.
            if pool.matches_search(&point, radius_km, &need) {
                found.push(PoolSummary::from(&pool));
            }
        }
        Ok(found)
    }

    async fn load(&self, id: PoolId) -> Result<RidePool, GatewayError> {
        let body =
            sqlx::query_scalar::<_, serde_json::Value>("SELECT body FROM ride_pools WHERE pool_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
                .ok_or(GatewayError::PoolNotFound(*id.as_uuid()))?;
        Ok(serde_json::from_value(body)?)
    }

    async fn save(
        &self,
        mut pool: RidePool,
        expected_version: u64,
    ) -> Result<RidePool, GatewayError> {
        pool.version = expected_version + 1;
        let cols = PoolColumns::from_pool(&pool)?;

        let affected = if expected_version == 0 {
            sqlx::query(
                "INSERT INTO ride_pools \
                 (pool_id, status, origin_lat, origin_lng, free_seats, free_luggage, version, body, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (pool_id) DO NOTHING",
            )
            .bind(pool.id.as_uuid())
            .bind(cols.status)
            .bind(cols.origin_lat)
            .bind(cols.origin_lng)
            .bind(cols.free_seats)
            .bind(cols.free_luggage)
            .bind(cols.version)
            .bind(cols.body)
            .bind(pool.updated_at)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE ride_pools SET status = $2, origin_lat = $3, origin_lng = $4, \
                 free_seats = $5, free_luggage = $6, version = $7, body = $8, updated_at = $9 \
                 WHERE pool_id = $1 AND version = $10",
            )
            .bind(pool.id.as_uuid())
            .bind(cols.status)
            .bind(cols.origin_lat)
            .bind(cols.origin_lng)
            .bind(cols.free_seats)
            .bind(cols.free_luggage)
            .bind(cols.version)
            .bind(cols.body)
            .bind(pool.updated_at)
            .bind(to_bigint(expected_version)?)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if affected == 1 {
            Ok(pool)
        } else {
            Err(self.conflict(pool.id, expected_version).await)
        }
    }
}
