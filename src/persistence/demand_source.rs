//! [`DemandSource`] computed from the request and pool tables.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{Demand, DemandSource, Region, TimeBucket};
use crate::error::GatewayError;

/// Demand derived live: unexpired pending requests picked up in the region
/// during the bucket versus free seats of open pools starting there.
#[derive(Debug, Clone)]
pub struct PostgresDemandSource {
    pool: PgPool,
}

impl PostgresDemandSource {
    /// Creates a demand source on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DemandSource for PostgresDemandSource {
    async fn current_demand(
        &self,
        region: &Region,
        bucket: &TimeBucket,
    ) -> Result<Demand, GatewayError> {
        let bounds = region.bounds();

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ride_requests \
             WHERE status = 'pending' AND expires_at > now() \
               AND pickup_lat >= $1 AND pickup_lat < $2 \
               AND pickup_lng >= $3 AND pickup_lng < $4 \
               AND created_at >= $5 AND created_at < $6",
        )
        .bind(bounds.min_lat)
        .bind(bounds.max_lat)
        .bind(bounds.min_lng)
        .bind(bounds.max_lng)
        .bind(bucket.start)
        .bind(bucket.end())
        .fetch_one(&self.pool)
        .await?;

        let capacity = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(free_seats), 0)::BIGINT FROM ride_pools \
             WHERE status IN ('forming', 'matched') \
               AND origin_lat >= $1 AND origin_lat < $2 \
               AND origin_lng >= $3 AND origin_lng < $4",
        )
        .bind(bounds.min_lat)
        .bind(bounds.max_lat)
        .bind(bounds.min_lng)
        .bind(bounds.max_lng)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(region = %region.key(), active, capacity, "demand read");
        Ok(Demand::new(saturate(active), saturate(capacity)))
    }
}

fn saturate(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}
