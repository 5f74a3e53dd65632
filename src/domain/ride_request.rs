//! Ride request value object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, PoolId, RequestId};
use crate::error::GatewayError;

/// Maximum passengers a single request may book.
pub const MAX_PASSENGERS: u32 = 4;

/// Maximum luggage pieces a single request may carry.
pub const MAX_LUGGAGE: u32 = 6;

/// Lifecycle state of a ride request. Terminal states are never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting assignment.
    Pending,
    /// Assigned to a pool.
    Matched,
    /// Expired before assignment.
    Expired,
    /// Cancelled by the requester, or dropped after matching failed.
    Cancelled,
}

impl RequestStatus {
    /// Lower-case name as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stored name.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on an unknown name.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "pending" => Ok(Self::Pending),
            "matched" => Ok(Self::Matched),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(GatewayError::Persistence(format!(
                "unknown request status: {other}"
            ))),
        }
    }

    /// Whether a request in `self` may move to `next`.
    ///
    /// Pending requests move anywhere; matched requests may only be
    /// cancelled; expired and cancelled requests are final.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, _) | (Self::Matched, Self::Cancelled)
        )
    }
}

/// An incoming request for a shared ride.
///
/// Immutable after creation except for `status` and `matched_pool_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Opaque reference to the requesting rider.
    pub requester: String,
    /// Where the rider is picked up.
    pub pickup: GeoPoint,
    /// Where the rider is dropped off.
    pub dropoff: GeoPoint,
    /// Seats needed, `1..=4`.
    pub passenger_count: u32,
    /// Luggage pieces, `0..=6`.
    pub luggage_count: u32,
    /// Largest acceptable relative route growth, `0.0..=1.0`.
    pub detour_tolerance: f64,
    /// Intake timestamp.
    pub created_at: DateTime<Utc>,
    /// After this instant the request can no longer be matched.
    pub expires_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// Pool the request was assigned to, once matched.
    pub matched_pool_id: Option<PoolId>,
}

impl RideRequest {
    /// Creates a pending request.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        requester: impl Into<String>,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        passenger_count: u32,
        luggage_count: u32,
        detour_tolerance: f64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            requester: requester.into(),
            pickup,
            dropoff,
            passenger_count,
            luggage_count,
            detour_tolerance,
            created_at,
            expires_at,
            status: RequestStatus::Pending,
            matched_pool_id: None,
        }
    }

    /// Checks geo and capacity fields before any matching work.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.requester.trim().is_empty() {
            return Err(GatewayError::Validation(
                "requester must not be empty".to_string(),
            ));
        }
        self.pickup.validate("pickup")?;
        self.dropoff.validate("dropoff")?;
        if !(1..=MAX_PASSENGERS).contains(&self.passenger_count) {
            return Err(GatewayError::Validation(format!(
                "passenger_count must be between 1 and {MAX_PASSENGERS}"
            )));
        }
        if self.luggage_count > MAX_LUGGAGE {
            return Err(GatewayError::Validation(format!(
                "luggage_count must be at most {MAX_LUGGAGE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.detour_tolerance) {
            return Err(GatewayError::Validation(
                "detour_tolerance must be between 0 and 1".to_string(),
            ));
        }
        if self.expires_at <= self.created_at {
            return Err(GatewayError::Validation(
                "expires_at must be after created_at".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Direct pickup-to-dropoff great-circle distance in kilometers.
    #[must_use]
    pub fn direct_distance_km(&self) -> f64 {
        self.pickup.distance_km(&self.dropoff)
    }
}
