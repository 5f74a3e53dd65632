//! Ride pool aggregate: route, passengers, capacity, pricing, version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, PoolId, RequestId};
use crate::error::GatewayError;

/// Upper bound on what a pool may charge, as a share of its passengers'
/// summed solo fares.
pub const MAX_FAIRNESS_CAP: f64 = 0.85;

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// One confirmed passenger, open for joins.
    Forming,
    /// Two or more confirmed passengers, still open for joins.
    Matched,
    /// Trip under way (set externally).
    Active,
    /// Trip finished (set externally).
    Completed,
    /// Every passenger left.
    Cancelled,
}

impl PoolStatus {
    /// Lower-case name as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Matched => "matched",
            Self::Active => "active",
            Self::Completed => "completed",
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
            "forming" => Ok(Self::Forming),
            "matched" => Ok(Self::Matched),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(GatewayError::Persistence(format!(
                "unknown pool status: {other}"
            ))),
        }
    }

    /// Whether new passengers may join or leave through matching.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Forming | Self::Matched)
    }
}

/// Pickup or dropoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    /// Passenger boards.
    Pickup,
    /// Passenger alights.
    Dropoff,
}

/// One stop in a pool's route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Request this stop belongs to.
    pub request_id: RequestId,
    /// Pickup or dropoff.
    pub kind: StopKind,
    /// Stop coordinates.
    pub location: GeoPoint,
    /// Zero-based position in the route.
    pub sequence: u32,
}

impl Stop {
    /// Pickup stop for `request_id` (sequence assigned on reindex).
    #[must_use]
    pub const fn pickup(request_id: RequestId, location: GeoPoint) -> Self {
        Self {
            request_id,
            kind: StopKind::Pickup,
            location,
            sequence: 0,
        }
    }

    /// Dropoff stop for `request_id` (sequence assigned on reindex).
    #[must_use]
    pub const fn dropoff(request_id: RequestId, location: GeoPoint) -> Self {
        Self {
            request_id,
            kind: StopKind::Dropoff,
            location,
            sequence: 0,
        }
    }
}

/// Rewrites `sequence` so it matches each stop's position.
pub fn reindex_stops(stops: &mut [Stop]) {
    for (idx, stop) in stops.iter_mut().enumerate() {
        stop.sequence = u32::try_from(idx).unwrap_or(u32::MAX);
    }
}

/// Seat and luggage quantities, used for both capacity and occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    /// Seats.
    pub seats: u32,
    /// Luggage pieces.
    pub luggage: u32,
}

impl Load {
    /// Creates a load.
    #[must_use]
    pub const fn new(seats: u32, luggage: u32) -> Self {
        Self { seats, luggage }
    }

    /// Remaining room when `self` is a capacity and `used` the occupancy.
    #[must_use]
    pub const fn headroom(&self, used: &Self) -> Self {
        Self {
            seats: self.seats.saturating_sub(used.seats),
            luggage: self.luggage.saturating_sub(used.luggage),
        }
    }

    /// Whether `self` fits inside `limit` on both axes.
    #[must_use]
    pub const fn fits_within(&self, limit: &Self) -> bool {
        self.seats <= limit.seats && self.luggage <= limit.luggage
    }
}

/// Whether a pool passenger is still riding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    /// Counts toward route, occupancy, and pricing.
    Confirmed,
    /// Left the pool; kept for audit only.
    Cancelled,
}

/// A rider's entry in a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPassenger {
    /// Originating request.
    pub request_id: RequestId,
    /// Opaque rider reference.
    pub requester: String,
    /// Fare charged after fairness adjustment.
    pub price: f64,
    /// What this rider would pay alone.
    pub solo_price: f64,
    /// Seats booked.
    pub seats: u32,
    /// Luggage pieces booked.
    pub luggage: u32,
    /// Route growth caused by this rider at join time.
    pub detour_fraction: f64,
    /// Confirmed or cancelled.
    pub status: PassengerStatus,
    /// When the rider joined.
    pub joined_at: DateTime<Utc>,
}

impl PoolPassenger {
    /// Whether this entry counts toward the live pool.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == PassengerStatus::Confirmed
    }
}

/// Pricing figures captured at the last composition change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    /// Base fare of the latest quote.
    pub base_price: f64,
    /// Demand × time-of-day multiplier applied.
    pub surge_factor: f64,
    /// Sum of confirmed passengers' prices.
    pub total_price: f64,
    /// Pooling discount applied to the latest quote.
    pub pooling_discount: f64,
}

/// Aggregate root for a shared ride.
///
/// Repositories hand out owned snapshots of this type; a mutation is a new
/// snapshot written back under the version it was loaded at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidePool {
    /// Pool identifier.
    pub id: PoolId,
    /// Lifecycle state.
    pub status: PoolStatus,
    /// Ordered route.
    pub stops: Vec<Stop>,
    /// Every rider that ever joined, confirmed or cancelled.
    pub passengers: Vec<PoolPassenger>,
    /// Vehicle limits.
    pub capacity: Load,
    /// Seats and luggage used by confirmed passengers.
    pub occupancy: Load,
    /// Pricing figures.
    pub pricing: PricingSnapshot,
    /// Great-circle length of `stops`.
    pub total_distance_km: f64,
    /// Estimated driving time of `stops`.
    pub estimated_duration_min: u32,
    /// Committed mutation counter; 0 means never saved.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl RidePool {
    /// Creates an empty, unsaved pool.
    #[must_use]
    pub fn new(capacity: Load, now: DateTime<Utc>) -> Self {
        Self {
            id: PoolId::new(),
            status: PoolStatus::Forming,
            stops: Vec::new(),
            passengers: Vec::new(),
            capacity,
            occupancy: Load::default(),
            pricing: PricingSnapshot::default(),
            total_distance_km: 0.0,
            estimated_duration_min: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmed passengers in join order.
    pub fn confirmed_passengers(&self) -> impl Iterator<Item = &PoolPassenger> {
        self.passengers.iter().filter(|p| p.is_confirmed())
    }

    /// Number of confirmed passengers.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.confirmed_passengers().count()
    }

    /// Free seats and luggage.
    #[must_use]
    pub const fn headroom(&self) -> Load {
        self.capacity.headroom(&self.occupancy)
    }

    /// Whether `need` fits in the remaining room.
    #[must_use]
    pub const fn has_room_for(&self, need: &Load) -> bool {
        need.fits_within(&self.headroom())
    }

    /// Location of the first stop, used for radius search.
    #[must_use]
    pub fn route_origin(&self) -> Option<GeoPoint> {
        self.stops.first().map(|s| s.location)
    }

    /// Radius-search predicate shared by every [`super::PoolRepository`]:
    /// open status, enough headroom, origin within `radius_km` of `point`.
    #[must_use]
    pub fn matches_search(&self, point: &GeoPoint, radius_km: f64, need: &Load) -> bool {
        self.status.is_open()
            && self.has_room_for(need)
            && self
                .route_origin()
                .is_some_and(|origin| origin.distance_km(point) <= radius_km)
    }

    /// Recomputes occupancy from confirmed passengers.
    pub fn recompute_occupancy(&mut self) {
        self.occupancy = self
            .confirmed_passengers()
            .fold(Load::default(), |acc, p| {
                Load::new(acc.seats + p.seats, acc.luggage + p.luggage)
            });
    }

    /// Verifies the structural invariants of the aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] describing the first violation.
    pub fn check_invariants(&self) -> Result<(), GatewayError> {
        let violation = |msg: String| Err(GatewayError::Internal(format!("pool {}: {msg}", self.id)));

        if !self.occupancy.fits_within(&self.capacity) {
            return violation(format!(
                "occupancy {:?} exceeds capacity {:?}",
                self.occupancy, self.capacity
            ));
        }
        let confirmed = self.confirmed_count();
        if self.stops.len() != confirmed * 2 {
            return violation(format!(
                "{} stops for {confirmed} confirmed passengers",
                self.stops.len()
            ));
        }
        for (idx, stop) in self.stops.iter().enumerate() {
            if usize::try_from(stop.sequence).ok() != Some(idx) {
                return violation(format!("stop {idx} has sequence {}", stop.sequence));
            }
        }
        for passenger in self.confirmed_passengers() {
            let position = |kind: StopKind| {
                self.stops
                    .iter()
                    .position(|s| s.request_id == passenger.request_id && s.kind == kind)
            };
            match (position(StopKind::Pickup), position(StopKind::Dropoff)) {
                (Some(p), Some(d)) if p < d => {}
                _ => {
                    return violation(format!(
                        "request {} lacks an ordered pickup/dropoff pair",
                        passenger.request_id
                    ));
                }
            }
        }
        let solo: f64 = self.confirmed_passengers().map(|p| p.solo_price).sum();
        let paid: f64 = self.confirmed_passengers().map(|p| p.price).sum();
        if paid > MAX_FAIRNESS_CAP * solo + 1e-6 {
            return violation(format!(
                "fares {paid:.2} exceed {MAX_FAIRNESS_CAP} of solo total {solo:.2}"
            ));
        }
        Ok(())
    }
}

/// Lightweight pool view returned by radius search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSummary {
    /// Pool identifier.
    pub pool_id: PoolId,
    /// Lifecycle state.
    pub status: PoolStatus,
    /// Current route.
    pub stops: Vec<Stop>,
    /// Vehicle limits.
    pub capacity: Load,
    /// Current usage.
    pub occupancy: Load,
    /// Version the summary was read at.
    pub version: u64,
}

impl From<&RidePool> for PoolSummary {
    fn from(pool: &RidePool) -> Self {
        Self {
            pool_id: pool.id,
            status: pool.status,
            stops: pool.stops.clone(),
            capacity: pool.capacity,
            occupancy: pool.occupancy,
            version: pool.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger(request_id: RequestId, seats: u32, luggage: u32) -> PoolPassenger {
        PoolPassenger {
            request_id,
            requester: "rider".to_string(),
            price: 10.0,
            solo_price: 12.0,
            seats,
            luggage,
            detour_fraction: 0.0,
            status: PassengerStatus::Confirmed,
            joined_at: Utc::now(),
        }
    }

    fn single_rider_pool() -> RidePool {
        let mut pool = RidePool::new(Load::new(4, 4), Utc::now());
        let rid = RequestId::new();
        pool.stops = vec![
            Stop::pickup(rid, GeoPoint::new(0.0, 0.0)),
            Stop::dropoff(rid, GeoPoint::new(0.1, 0.1)),
        ];
        reindex_stops(&mut pool.stops);
        pool.passengers.push(passenger(rid, 2, 1));
        pool.recompute_occupancy();
        pool
    }

    #[test]
    fn occupancy_ignores_cancelled_passengers() {
        let mut pool = single_rider_pool();
        pool.passengers.push(PoolPassenger {
            status: PassengerStatus::Cancelled,
            ..passenger(RequestId::new(), 2, 2)
        });
        pool.recompute_occupancy();
        assert_eq!(pool.occupancy, Load::new(2, 1));
        assert_eq!(pool.headroom(), Load::new(2, 3));
    }

    #[test]
    fn room_check_covers_both_axes() {
        let pool = single_rider_pool();
        assert!(pool.has_room_for(&Load::new(2, 3)));
        assert!(!pool.has_room_for(&Load::new(3, 0)));
        assert!(!pool.has_room_for(&Load::new(1, 4)));
    }

    #[test]
    fn invariants_hold_for_well_formed_pool() {
        assert!(single_rider_pool().check_invariants().is_ok());
    }

    #[test]
    fn invariants_catch_dropoff_before_pickup() {
        let mut pool = single_rider_pool();
        pool.stops.reverse();
        reindex_stops(&mut pool.stops);
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn invariants_catch_missing_stops() {
        let mut pool = single_rider_pool();
        pool.stops.pop();
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn invariants_catch_fares_above_fairness_cap() {
        let mut pool = single_rider_pool();
        if let Some(p) = pool.passengers.first_mut() {
            p.price = 11.0;
        }
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn search_predicate_checks_status_room_and_radius() {
        let mut pool = single_rider_pool();
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(pool.matches_search(&origin, 1.0, &Load::new(1, 0)));
        assert!(!pool.matches_search(&GeoPoint::new(1.0, 1.0), 1.0, &Load::new(1, 0)));
        assert!(!pool.matches_search(&origin, 1.0, &Load::new(3, 0)));
        pool.status = PoolStatus::Active;
        assert!(!pool.matches_search(&origin, 1.0, &Load::new(1, 0)));
    }

    #[test]
    fn only_forming_and_matched_are_open() {
        assert!(PoolStatus::Forming.is_open());
        assert!(PoolStatus::Matched.is_open());
        assert!(!PoolStatus::Active.is_open());
        assert!(!PoolStatus::Cancelled.is_open());
    }

    #[test]
    fn summary_mirrors_pool() {
        let pool = single_rider_pool();
        let summary = PoolSummary::from(&pool);
        assert_eq!(summary.pool_id, pool.id);
        assert_eq!(summary.stops.len(), 2);
        assert_eq!(summary.occupancy, pool.occupancy);
    }
}
