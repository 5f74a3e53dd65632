//! In-memory [`RequestRepository`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ports::RequestRepository;
use super::ride_request::{RequestStatus, RideRequest};
use super::{PoolId, RequestId};
use crate::error::GatewayError;

/// Ride requests keyed by id.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: RwLock<HashMap<RequestId, RideRequest>>,
}

impl RequestRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests with the given status.
    pub async fn count_with_status(&self, status: RequestStatus) -> usize {
        self.requests
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}

#[async_trait]
impl RequestRepository for RequestRegistry {
    async fn save(&self, request: &RideRequest) -> Result<(), GatewayError> {
        self.requests
            .write()
            .await
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn load(&self, id: RequestId) -> Result<RideRequest, GatewayError> {
        self.requests
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GatewayError::RequestNotFound(*id.as_uuid()))
    }

    async fn update_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        matched_pool_id: Option<PoolId>,
    ) -> Result<(), GatewayError> {
        let mut map = self.requests.write().await;
        let request = map
            .get_mut(&id)
            .ok_or(GatewayError::RequestNotFound(*id.as_uuid()))?;
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
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::domain::GeoPoint;

    fn request() -> RideRequest {
        let now = Utc::now();
        RideRequest::new(
            "rider-7",
            GeoPoint::new(2.35, 48.85),
            GeoPoint::new(2.29, 48.86),
            1,
            0,
            0.2,
            now,
            now + Duration::minutes(5),
        )
    }

    #[tokio::test]
    async fn status_update_records_matched_pool() {
        let registry = RequestRegistry::new();
        let req = request();
        let _ = registry.save(&req).await;

        let pool_id = PoolId::new();
        let result = registry
            .update_status(req.id, RequestStatus::Matched, Some(pool_id))
            .await;
        assert!(result.is_ok());

        let Ok(stored) = registry.load(req.id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Matched);
        assert_eq!(stored.matched_pool_id, Some(pool_id));
        assert_eq!(registry.count_with_status(RequestStatus::Matched).await, 1);
    }

    #[tokio::test]
    async fn terminal_request_cannot_be_reopened() {
        let registry = RequestRegistry::new();
        let req = request();
        let _ = registry.save(&req).await;
        let _ = registry
            .update_status(req.id, RequestStatus::Expired, None)
            .await;

        let result = registry
            .update_status(req.id, RequestStatus::Matched, Some(PoolId::new()))
            .await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let registry = RequestRegistry::new();
        let result = registry
            .update_status(RequestId::new(), RequestStatus::Cancelled, None)
            .await;
        assert!(matches!(result, Err(GatewayError::RequestNotFound(_))));
    }
}
