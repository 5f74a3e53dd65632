//! Column projections of domain aggregates.

use crate::domain::{RidePool, RideRequest};
use crate::error::GatewayError;

/// Converts a domain counter into a `BIGINT`.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if the value exceeds `i64::MAX`.
pub fn to_bigint(value: u64) -> Result<i64, GatewayError> {
    i64::try_from(value).map_err(|_| GatewayError::Internal(format!("{value} overflows BIGINT")))
}

/// Reads a `BIGINT` counter back.
///
/// # Errors
///
/// Returns [`GatewayError::Persistence`] for a negative value.
pub fn from_bigint(value: i64) -> Result<u64, GatewayError> {
    u64::try_from(value).map_err(|_| GatewayError::Persistence(format!("negative counter {value}")))
}

/// Indexed columns of a `ride_pools` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolColumns {
    /// Lifecycle state name.
    pub status: &'static str,
    /// Latitude of the first stop, if any.
    pub origin_lat: Option<f64>,
    /// Longitude of the first stop, if any.
    pub origin_lng: Option<f64>,
    /// Unused seats.
    pub free_seats: i64,
    /// Unused luggage slots.
    pub free_luggage: i64,
    /// Version being written.
    pub version: i64,
    /// Full aggregate.
    pub body: serde_json::Value,
}

impl PoolColumns {
    /// Projects `pool` for storage.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the version overflows or the document
    /// cannot be serialized.
    pub fn from_pool(pool: &RidePool) -> Result<Self, GatewayError> {
        let origin = pool.route_origin();
        let headroom = pool.headroom();
        Ok(Self {
            status: pool.status.as_str(),
            origin_lat: origin.map(|o| o.lat),
            origin_lng: origin.map(|o| o.lng),
            free_seats: i64::from(headroom.seats),
            free_luggage: i64::from(headroom.luggage),
            version: to_bigint(pool.version)?,
            body: serde_json::to_value(pool)?,
        })
    }
}

/// Indexed columns of a `ride_requests` row.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestColumns {
    /// Lifecycle state name.
    pub status: &'static str,
    /// Pool the request joined, if any.
    pub matched_pool_id: Option<uuid::Uuid>,
    /// Full request.
    pub body: serde_json::Value,
}

impl RequestColumns {
    /// Projects `request` for storage.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the document cannot be
    /// serialized.
    pub fn from_request(request: &RideRequest) -> Result<Self, GatewayError> {
        Ok(Self {
            status: request.status.as_str(),
            matched_pool_id: request.matched_pool_id.map(Into::into),
            body: serde_json::to_value(request)?,
        })
    }
}
