//! PostgreSQL-backed [`RequestRepository`].

use async_trait::async_trait;
use sqlx::PgPool;

use super::models::RequestColumns;
use crate::domain::{PoolId, RequestId, RequestRepository, RequestStatus, RideRequest};
use crate::error::GatewayError;

/// Ride requests stored as JSONB documents.
#[derive(Debug, Clone)]
pub struct PostgresRequestRepository {
    pool: PgPool,
}

impl PostgresRequestRepository {
    /// Creates a repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestRepository for PostgresRequestRepository {
    async fn save(&self, request: &RideRequest) -> Result<(), GatewayError> {
        let cols = RequestColumns::from_request(request)?;
        sqlx::query(
            "INSERT INTO ride_requests \
             (request_id, requester, status, pickup_lat, pickup_lng, matched_pool_id, created_at, expires_at, body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (request_id) DO UPDATE \
             SET status = EXCLUDED.status, matched_pool_id = EXCLUDED.matched_pool_id, body = EXCLUDED.body",
        )
        .bind(request.id.as_uuid())
        .bind(&request.requester)
        .bind(cols.status)
        .bind(request.pickup.lat)
        .bind(request.pickup.lng)
        .bind(cols.matched_pool_id)
        .bind(request.created_at)
        .bind(request.expires_at)
        .bind(cols.body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: RequestId) -> Result<RideRequest, GatewayError> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM ride_requests WHERE request_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GatewayError::RequestNotFound(*id.as_uuid()))?;
        Ok(serde_json::from_value(body)?)
    }

    async fn update_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        matched_pool_id: Option<PoolId>,
    ) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM ride_requests WHERE request_id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(GatewayError::RequestNotFound(*id.as_uuid()))?;

        let mut request: RideRequest = serde_json::from_value(body)?;
        if !request.status.can_transition_to(status) {
            return Err(GatewayError::Validation(format!(
                "request {id} cannot move from {} to {}",
                request.status.as_str(),
                status.as_str()
            )));
        }
        request.status = status;
        if matched_pool_id.is_some() {
            request.matched_pool_id = matched_pool_id;
        }

        let cols = RequestColumns::from_request(&request)?;
        sqlx::query(
            "UPDATE ride_requests SET status = $2, matched_pool_id = $3, body = $4 WHERE request_id = $1",
        )
        .bind(id.as_uuid())
        .bind(cols.status)
        .bind(cols.matched_pool_id)
        .bind(cols.body)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
