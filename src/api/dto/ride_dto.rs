//! Ride intake DTOs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{GeoPoint, RideRequest};
use crate::service::RideAssignment;

/// Detour tolerance applied when the client sends none.
pub const DEFAULT_DETOUR_TOLERANCE: f64 = 0.3;

/// Request body for `POST /rides`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RideRequestDto {
    /// Opaque rider reference.
    pub requester: String,
    /// Pickup as `[lng, lat]`.
    #[schema(value_type = Vec<f64>)]
    pub pickup: [f64; 2],
    /// Dropoff as `[lng, lat]`.
    #[schema(value_type = Vec<f64>)]
    pub dropoff: [f64; 2],
    /// Seats needed (1–4).
    pub passenger_count: u32,
    /// Luggage pieces (0–6).
    #[serde(default)]
    pub luggage_count: u32,
    /// Largest acceptable relative route growth (0–1). Defaults to 0.3.
    #[serde(default)]
    pub detour_tolerance: Option<f64>,
    /// Absolute expiry. Defaults to intake time plus the configured TTL.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RideRequestDto {
    /// Builds a pending domain request received at `now`.
    #[must_use]
    pub fn into_request(self, now: DateTime<Utc>, default_ttl: std::time::Duration) -> RideRequest {
        let [pickup_lng, pickup_lat] = self.pickup;
        let [dropoff_lng, dropoff_lat] = self.dropoff;
        let expires_at = self.expires_at.unwrap_or_else(|| {
            now + Duration::from_std(default_ttl).unwrap_or_else(|_| Duration::minutes(10))
        });
        RideRequest::new(
            self.requester,
            GeoPoint::new(pickup_lng, pickup_lat),
            GeoPoint::new(dropoff_lng, dropoff_lat),
            self.passenger_count,
            self.luggage_count,
            self.detour_tolerance.unwrap_or(DEFAULT_DETOUR_TOLERANCE),
            now,
            expires_at,
        )
    }
}

/// Response body for `POST /rides` (201 Created).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RideAssignmentResponse {
    /// Stored request identifier.
    pub request_id: uuid::Uuid,
    /// Assigned pool.
    pub pool_id: uuid::Uuid,
    /// Whether the pool was opened for this request.
    pub is_new_pool: bool,
    /// Fare after the fairness cap.
    pub price: f64,
    /// Route growth this rider caused.
    pub detour_fraction: f64,
    /// Committed pool version.
    pub pool_version: u64,
}

impl From<RideAssignment> for RideAssignmentResponse {
    fn from(a: RideAssignment) -> Self {
        Self {
            request_id: a.request_id.into(),
            pool_id: a.pool_id.into(),
            is_new_pool: a.is_new_pool,
            price: a.price,
            detour_fraction: a.detour_fraction,
            pool_version: a.pool_version,
        }
    }
}
