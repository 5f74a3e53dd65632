//! Pool detail DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Load, PoolPassenger, RidePool, Stop};

/// Seats and luggage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct LoadDto {
    /// Seats.
    pub seats: u32,
    /// Luggage pieces.
    pub luggage: u32,
}

impl From<Load> for LoadDto {
    fn from(l: Load) -> Self {
        Self {
            seats: l.seats,
            luggage: l.luggage,
        }
    }
}

/// One route stop.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopDto {
    /// Owning request.
    pub request_id: uuid::Uuid,
    /// `pickup` or `dropoff`.
    pub kind: String,
    /// `[lng, lat]`.
    #[schema(value_type = Vec<f64>)]
    pub location: [f64; 2],
    /// Position in the route.
    pub sequence: u32,
}

impl From<&Stop> for StopDto {
    fn from(s: &Stop) -> Self {
        Self {
            request_id: s.request_id.into(),
            kind: match s.kind {
                crate::domain::StopKind::Pickup => "pickup",
                crate::domain::StopKind::Dropoff => "dropoff",
            }
            .to_string(),
            location: [s.location.lng, s.location.lat],
            sequence: s.sequence,
        }
    }
}

/// A rider's entry in a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PassengerDto {
    /// Originating request.
    pub request_id: uuid::Uuid,
    /// Rider reference.
    pub requester: String,
    /// Fare charged.
    pub price: f64,
    /// Fare without sharing.
    pub solo_price: f64,
    /// Seats booked.
    pub seats: u32,
    /// Luggage booked.
    pub luggage: u32,
    /// Route growth at join time.
    pub detour_fraction: f64,
    /// `confirmed` or `cancelled`.
    pub status: String,
    /// Join timestamp.
    pub joined_at: DateTime<Utc>,
}

impl From<&PoolPassenger> for PassengerDto {
    fn from(p: &PoolPassenger) -> Self {
        Self {
            request_id: p.request_id.into(),
            requester: p.requester.clone(),
            price: p.price,
            solo_price: p.solo_price,
            seats: p.seats,
            luggage: p.luggage,
            detour_fraction: p.detour_fraction,
            status: if p.is_confirmed() {
                "confirmed"
            } else {
                "cancelled"
            }
            .to_string(),
            joined_at: p.joined_at,
        }
    }
}

/// Pricing figures of a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PricingDto {
    /// Base fare of the latest quote.
    pub base_price: f64,
    /// Demand × time-of-day multiplier.
    pub surge_factor: f64,
    /// Sum of confirmed fares.
    pub total_price: f64,
    /// Latest pooling discount.
    pub pooling_discount: f64,
}

/// Response body for `GET /pools/:id` and passenger cancellation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolDetailResponse {
    /// Pool identifier.
    pub pool_id: uuid::Uuid,
    /// Lifecycle state.
    pub status: String,
    /// Ordered route.
    pub stops: Vec<StopDto>,
    /// Every rider that joined, confirmed or cancelled.
    pub passengers: Vec<PassengerDto>,
    /// Vehicle limits.
    pub capacity: LoadDto,
    /// Current usage.
    pub occupancy: LoadDto,
    /// Pricing figures.
    pub pricing: PricingDto,
    /// Route length in kilometers.
    pub total_distance_km: f64,
    /// Estimated driving time.
    pub estimated_duration_min: u32,
    /// Committed version.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&RidePool> for PoolDetailResponse {
    fn from(pool: &RidePool) -> Self {
        Self {
            pool_id: pool.id.into(),
            status: pool.status.as_str().to_string(),
            stops: pool.stops.iter().map(StopDto::from).collect(),
            passengers: pool.passengers.iter().map(PassengerDto::from).collect(),
            capacity: pool.capacity.into(),
            occupancy: pool.occupancy.into(),
            pricing: PricingDto {
                base_price: pool.pricing.base_price,
                surge_factor: pool.pricing.surge_factor,
                total_price: pool.pricing.total_price,
                pooling_discount: pool.pricing.pooling_discount,
            },
            total_distance_km: pool.total_distance_km,
            estimated_duration_min: pool.estimated_duration_min,
            version: pool.version,
            created_at: pool.created_at,
            updated_at: pool.updated_at,
        }
    }
}
