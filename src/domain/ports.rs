//! Contracts the matching core consumes.
//!
//! The coordinator only ever talks to these traits. In-memory
//! implementations live in this module's siblings; PostgreSQL ones in
//! [`crate::persistence`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::demand::{Demand, Region, TimeBucket};
use super::ride_pool::{PoolSummary, RidePool};
use super::ride_request::{RequestStatus, RideRequest};
use super::{GeoPoint, PoolId, RequestId};
use crate::error::GatewayError;

/// Versioned storage for [`RidePool`] aggregates.
#[async_trait]
pub trait PoolRepository: Send + Sync + fmt::Debug {
    /// Open pools (`forming`/`matched`) whose route origin lies within
    /// `radius_km` of `point` and which have at least the given free seats
    /// and luggage.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn find_nearby(
        &self,
        point: GeoPoint,
        radius_km: f64,
        min_seats: u32,
        min_luggage: u32,
    ) -> Result<Vec<PoolSummary>, GatewayError>;

    /// Loads an owned snapshot of the pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PoolNotFound`] for an unknown id.
    async fn load(&self, id: PoolId) -> Result<RidePool, GatewayError>;

    /// Writes `pool` if the stored version equals `expected_version`
    /// (0 for a pool that must not exist yet) and returns the committed
    /// snapshot, whose version is `expected_version + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConcurrencyConflict`] on a version mismatch
    /// and [`GatewayError::PoolNotFound`] when updating a missing pool.
    async fn save(&self, pool: RidePool, expected_version: u64) -> Result<RidePool, GatewayError>;
}

/// Storage for [`RideRequest`]s.
#[async_trait]
pub trait RequestRepository: Send + Sync + fmt::Debug {
    /// Inserts or replaces a request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn save(&self, request: &RideRequest) -> Result<(), GatewayError>;

    /// Loads a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RequestNotFound`] for an unknown id.
    async fn load(&self, id: RequestId) -> Result<RideRequest, GatewayError>;

    /// Moves a request to `status`, recording the matched pool if given.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RequestNotFound`] for an unknown id and
    /// [`GatewayError::Validation`] for a transition out of a terminal
    /// state.
    async fn update_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        matched_pool_id: Option<PoolId>,
    ) -> Result<(), GatewayError>;
}

/// Source of live supply/demand figures for surge pricing.
#[async_trait]
pub trait DemandSource: Send + Sync + fmt::Debug {
    /// Demand observed in `region` during `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] when the figures cannot be read.
    async fn current_demand(
        &self,
        region: &Region,
        bucket: &TimeBucket,
    ) -> Result<Demand, GatewayError>;
}

/// Wall-clock abstraction so time-of-day pricing is testable.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}
