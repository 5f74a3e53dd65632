//! Matching coordinator: assigns ride requests to pools.
//!
//! Every mutation follows the same pattern: acquire the pool lock → load a
//! fresh snapshot → re-validate → mutate → versioned save → release →
//! emit event. Candidate search runs without locks on summaries that may
//! already be stale; the locked re-validation catches that.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

use super::pricing_engine::{PricingEngine, Quote, QuoteContext};
use super::route_optimizer::{Detour, RouteOptimizer};
use crate::config::{MatchingSettings, RankingStrategy};
use crate::domain::{
    Clock, DemandSource, EventBus, Load, PassengerStatus, PoolEvent, PoolId, PoolPassenger,
    PoolRepository, PoolStatus, PoolSummary, Region, RequestId, RequestRepository,
    RequestStatus, RideRequest, RidePool, Stop, TimeBucket,
};
use crate::domain::ride_pool::reindex_stops;
use crate::error::GatewayError;
use crate::lock::{LockStore, PoolLockManager};

/// Outcome of [`MatchingCoordinator::process_ride_request`].
#[derive(Debug, Clone, PartialEq)]
pub struct RideAssignment {
    /// The assigned request.
    pub request_id: RequestId,
    /// Pool the rider now belongs to.
    pub pool_id: PoolId,
    /// Whether the pool was opened for this request.
    pub is_new_pool: bool,
    /// Fare after the fairness cap.
    pub price: f64,
    /// Route growth the rider caused (0 for a new pool).
    pub detour_fraction: f64,
    /// Committed pool version.
    pub pool_version: u64,
}

/// A pool that passed the detour filter, with its ranking cost.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Pool as seen by the search.
    pub summary: PoolSummary,
    /// Best insertion into the summary's route.
    pub detour: Detour,
    /// Ranking cost; lower is better.
    pub cost: f64,
}

/// Orchestrates search, ranking, joins, and cancellations.
///
/// Holds `Arc` references to every collaborator; cheap to clone.
#[derive(Debug, Clone)]
pub struct MatchingCoordinator {
    pools: Arc<dyn PoolRepository>,
    requests: Arc<dyn RequestRepository>,
    demand: Arc<dyn DemandSource>,
    locks: PoolLockManager,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    optimizer: RouteOptimizer,
    pricing: PricingEngine,
    settings: MatchingSettings,
}

impl MatchingCoordinator {
    /// Wires a coordinator from its collaborators.
    #[must_use]
    pub fn new(
        pools: Arc<dyn PoolRepository>,
        requests: Arc<dyn RequestRepository>,
        demand: Arc<dyn DemandSource>,
        lock_store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        settings: MatchingSettings,
    ) -> Self {
        Self {
            pools,
            requests,
            demand,
            locks: PoolLockManager::new(lock_store, settings.lock.clone()),
            clock,
            event_bus,
            optimizer: RouteOptimizer::new(&settings.route),
            pricing: PricingEngine::new(&settings.pricing),
            settings,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Active matching settings.
    #[must_use]
    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validates, stores, and assigns a request to an existing or new pool.
    ///
    /// A stored request that fails to match is cancelled, except after
    /// contention ([`GatewayError::is_retryable`]), where it stays pending
    /// until it expires.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] for malformed or expired
    /// requests and for requests larger than an empty vehicle,
    /// [`GatewayError::LockTimeout`] or [`GatewayError::ConcurrencyConflict`]
    /// when contention persists, and propagates repository failures.
    pub async fn process_ride_request(
        &self,
        mut request: RideRequest,
    ) -> Result<RideAssignment, GatewayError> {
        request.validate()?;
        self.ensure_fits_vehicle(&request)?;

        let now = self.clock.now();
        if request.is_expired(now) {
            request.status = RequestStatus::Expired;
            self.requests.save(&request).await?;
            tracing::info!(request_id = %request.id, "ride request expired before matching");
            return Err(GatewayError::Validation(format!(
                "request {} expired at {}",
                request.id, request.expires_at
            )));
        }
        self.requests.save(&request).await?;

        let assignment = match self.assign(&request).await {
            Ok(assignment) => assignment,
            Err(e) => {
                self.abandon(&request, &e).await;
                return Err(e);
            }
        };

        self.requests
            .update_status(request.id, RequestStatus::Matched, Some(assignment.pool_id))
            .await?;
        Ok(assignment)
    }

    /// Joins the cheapest acceptable candidate or opens a new pool.
    async fn assign(&self, request: &RideRequest) -> Result<RideAssignment, GatewayError> {
        let mut excluded = HashSet::new();
        let mut assignment = None;
        for _ in 0..self.settings.matching.max_join_attempts {
            let candidates = self.find_candidates(request, &excluded).await?;
            let Some(best) = candidates.into_iter().next() else {
                break;
            };
            let pool_id = best.summary.pool_id;
            match self.attempt_join(pool_id, request).await {
                Ok(joined) => {
                    assignment = Some(joined);
                    break;
                }
                Err(e) if e.is_candidate_rejection() => {
                    tracing::debug!(%pool_id, request_id = %request.id, reason = %e, "candidate rejected under lock");
                    excluded.insert(pool_id);
                }
                Err(e) => return Err(e),
            }
        }

        match assignment {
            Some(a) => Ok(a),
            None => self.create_pool(request).await,
        }
    }

    /// Settles a stored request whose matching failed.
    async fn abandon(&self, request: &RideRequest, cause: &GatewayError) {
        if cause.is_retryable() {
            tracing::warn!(request_id = %request.id, error = %cause, "matching contended, request left pending");
            return;
        }
        match self
            .requests
            .update_status(request.id, RequestStatus::Cancelled, None)
            .await
        {
            Ok(()) => {
                tracing::info!(request_id = %request.id, error = %cause, "unmatched request cancelled");
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "could not cancel unmatched request");
            }
        }
    }

    fn ensure_fits_vehicle(&self, request: &RideRequest) -> Result<(), GatewayError> {
        let vehicle = self.settings.matching.vehicle_capacity;
        if Load::new(request.passenger_count, request.luggage_count).fits_within(&vehicle) {
            return Ok(());
        }
        Err(GatewayError::Validation(format!(
            "request {} needs {} seats and {} luggage but vehicles hold {} and {}",
            request.id, request.passenger_count, request.luggage_count, vehicle.seats, vehicle.luggage
        )))
    }

    /// Open pools near the pickup that can take the request within its
    /// detour tolerance, cheapest first. Ties keep repository order.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn find_candidates(
        &self,
        request: &RideRequest,
        excluded: &HashSet<PoolId>,
    ) -> Result<Vec<Candidate>, GatewayError> {
        let summaries = self
            .pools
            .find_nearby(
                request.pickup,
                self.settings.matching.search_radius_km,
                request.passenger_count,
                request.luggage_count,
            )
            .await?;

        let (pickup, dropoff) = stops_for(request);
        let mut candidates: Vec<Candidate> = summaries
            .into_iter()
            .filter(|s| !excluded.contains(&s.pool_id))
            .filter_map(|summary| {
                let detour = self.optimizer.detour(&summary.stops, &pickup, &dropoff);
                if detour.detour_fraction > request.detour_tolerance {
                    tracing::debug!(
                        pool_id = %summary.pool_id,
                        detour = detour.detour_fraction,
                        tolerance = request.detour_tolerance,
                        "candidate exceeds detour tolerance"
                    );
                    return None;
                }
                let cost = self.cost(&summary, detour.detour_fraction);
                tracing::debug!(pool_id = %summary.pool_id, detour = detour.detour_fraction, cost, "candidate accepted");
                Some(Candidate {
                    summary,
                    detour,
                    cost,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        Ok(candidates)
    }

    /// Joins `request` into `pool_id` under the pool lock.
    ///
    /// A version conflict reloads and retries once. The lock is released on
    /// every path.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CapacityExceeded`] or
    /// [`GatewayError::DetourExceeded`] when the fresh pool no longer fits,
    /// [`GatewayError::LockTimeout`] when the lock stays busy, and
    /// [`GatewayError::ConcurrencyConflict`] after a second stale write.
    pub async fn attempt_join(
        &self,
        pool_id: PoolId,
        request: &RideRequest,
    ) -> Result<RideAssignment, GatewayError> {
        let lock = self.locks.acquire(pool_id).await?;
        let result = match self.join_locked(pool_id, request).await {
            Err(GatewayError::ConcurrencyConflict { found, .. }) => {
                tracing::warn!(%pool_id, found, "version conflict on join, retrying");
                self.join_locked(pool_id, request).await
            }
            other => other,
        };
        self.locks.release(lock).await;
        result
    }

    async fn join_locked(
        &self,
        pool_id: PoolId,
        request: &RideRequest,
    ) -> Result<RideAssignment, GatewayError> {
        let mut pool = self.pools.load(pool_id).await?;
        let need = Load::new(request.passenger_count, request.luggage_count);
        if !pool.status.is_open() || !pool.has_room_for(&need) {
            return Err(GatewayError::CapacityExceeded(*pool_id.as_uuid()));
        }

        let (pickup, dropoff) = stops_for(request);
        let detour = self.optimizer.detour(&pool.stops, &pickup, &dropoff);
        if detour.detour_fraction > request.detour_tolerance {
            return Err(GatewayError::DetourExceeded {
                pool_id: *pool_id.as_uuid(),
                detour: detour.detour_fraction,
                tolerance: request.detour_tolerance,
            });
        }

        let now = self.clock.now();
        let pool_size = pool.confirmed_count() + 1;
        let quote = self
            .quote(request, now, pool_size, detour.detour_fraction)
            .await?;

        pool.stops = detour.route;
        pool.total_distance_km = detour.total_distance_km;
        pool.estimated_duration_min = self.optimizer.estimate_duration(pool.total_distance_km);
        pool.passengers
            .push(passenger(request, &quote, detour.detour_fraction, now));
        pool.recompute_occupancy();
        self.apply_quote(&mut pool, &quote);
        if pool.confirmed_count() >= 2 {
            pool.status = PoolStatus::Matched;
        }
        pool.updated_at = now;
        pool.check_invariants()?;

        let expected = pool.version;
        let committed = self.pools.save(pool, expected).await?;
        let price = price_of(&committed, request.id);

        let _ = self.event_bus.publish(PoolEvent::PassengerJoined {
            pool_id,
            request_id: request.id,
            price,
            detour_fraction: detour.detour_fraction,
            passenger_count: committed.confirmed_count(),
            version: committed.version,
            timestamp: now,
        });
        tracing::info!(
            %pool_id,
            request_id = %request.id,
            detour = detour.detour_fraction,
            price,
            version = committed.version,
            "passenger joined pool"
        );

        Ok(RideAssignment {
            request_id: request.id,
            pool_id,
            is_new_pool: false,
            price,
            detour_fraction: detour.detour_fraction,
            pool_version: committed.version,
        })
    }

    /// Opens a new pool with `request` as its only passenger.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if the request does not fit an
    /// empty vehicle and propagates repository failures.
    pub async fn create_pool(&self, request: &RideRequest) -> Result<RideAssignment, GatewayError> {
        self.ensure_fits_vehicle(request)?;
        let now = self.clock.now();
        let mut pool = RidePool::new(self.settings.matching.vehicle_capacity, now);

        let (pickup, dropoff) = stops_for(request);
        let detour = self.optimizer.detour(&[], &pickup, &dropoff);
        let quote = self.quote(request, now, 1, 0.0).await?;

        pool.stops = detour.route;
        pool.total_distance_km = detour.total_distance_km;
        pool.estimated_duration_min = self.optimizer.estimate_duration(pool.total_distance_km);
        pool.passengers.push(passenger(request, &quote, 0.0, now));
        pool.recompute_occupancy();
        self.apply_quote(&mut pool, &quote);
        pool.check_invariants()?;

        let pool_id = pool.id;
        let committed = self.pools.save(pool, 0).await?;
        let price = price_of(&committed, request.id);

        let _ = self.event_bus.publish(PoolEvent::PoolCreated {
            pool_id,
            request_id: request.id,
            price,
            version: committed.version,
            timestamp: now,
        });
        tracing::info!(%pool_id, request_id = %request.id, price, "pool created");

        Ok(RideAssignment {
            request_id: request.id,
            pool_id,
            is_new_pool: true,
            price,
            detour_fraction: 0.0,
            pool_version: committed.version,
        })
    }

    /// Removes `requester` from `pool_id` and returns the committed pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PassengerNotFound`] if the requester never
    /// joined, [`GatewayError::AlreadyRemoved`] if they already left,
    /// [`GatewayError::Validation`] for a pool that is no longer open, and
    /// the lock and version errors of [`Self::attempt_join`].
    pub async fn cancel_ride(
        &self,
        requester: &str,
        pool_id: PoolId,
    ) -> Result<RidePool, GatewayError> {
        let lock = self.locks.acquire(pool_id).await?;
        let result = match self.cancel_locked(requester, pool_id).await {
            Err(GatewayError::ConcurrencyConflict { found, .. }) => {
                tracing::warn!(%pool_id, found, "version conflict on cancel, retrying");
                self.cancel_locked(requester, pool_id).await
            }
            other => other,
        };
        self.locks.release(lock).await;

        let (committed, request_id) = result?;
        self.requests
            .update_status(request_id, RequestStatus::Cancelled, None)
            .await?;
        Ok(committed)
    }

    async fn cancel_locked(
        &self,
        requester: &str,
        pool_id: PoolId,
    ) -> Result<(RidePool, RequestId), GatewayError> {
        let mut pool = self.pools.load(pool_id).await?;
        if !pool.status.is_open() {
            return Err(GatewayError::Validation(format!(
                "pool {pool_id} is {} and cannot be changed",
                pool.status.as_str()
            )));
        }

        let Some(entry) = pool
            .passengers
            .iter_mut()
            .find(|p| p.requester == requester && p.is_confirmed())
        else {
            let ever_joined = pool.passengers.iter().any(|p| p.requester == requester);
            return Err(if ever_joined {
                GatewayError::AlreadyRemoved {
                    pool_id: *pool_id.as_uuid(),
                    requester: requester.to_string(),
                }
            } else {
                GatewayError::PassengerNotFound {
                    pool_id: *pool_id.as_uuid(),
                    requester: requester.to_string(),
                }
            });
        };
        entry.status = PassengerStatus::Cancelled;
        let request_id = entry.request_id;

        if pool.confirmed_count() == 0 {
            pool.status = PoolStatus::Cancelled;
            pool.stops.clear();
            pool.total_distance_km = 0.0;
            pool.estimated_duration_min = 0;
            pool.recompute_occupancy();
            pool.pricing.total_price = 0.0;
        } else {
            pool.stops.retain(|s| s.request_id != request_id);
            reindex_stops(&mut pool.stops);
            pool.total_distance_km = RouteOptimizer::route_distance(&pool.stops);
            pool.estimated_duration_min = self.optimizer.estimate_duration(pool.total_distance_km);
            pool.recompute_occupancy();
            self.pricing.rebalance(&mut pool);
        }
        let now = self.clock.now();
        pool.updated_at = now;
        pool.check_invariants()?;

        let expected = pool.version;
        let committed = self.pools.save(pool, expected).await?;
        let remaining = committed.confirmed_count();

        let event = if committed.status == PoolStatus::Cancelled {
            PoolEvent::PoolCancelled {
                pool_id,
                request_id,
                version: committed.version,
                timestamp: now,
            }
        } else {
            PoolEvent::PassengerCancelled {
                pool_id,
                request_id,
                remaining_passengers: remaining,
                version: committed.version,
                timestamp: now,
            }
        };
        let _ = self.event_bus.publish(event);
        tracing::info!(%pool_id, %request_id, remaining, version = committed.version, "passenger cancelled");

        Ok((committed, request_id))
    }

    /// Current committed state of a pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PoolNotFound`] for an unknown id.
    pub async fn pool_snapshot(&self, pool_id: PoolId) -> Result<RidePool, GatewayError> {
        self.pools.load(pool_id).await
    }

    fn cost(&self, summary: &PoolSummary, detour_fraction: f64) -> f64 {
        let detour_cost = detour_fraction * 100.0;
        match self.settings.matching.ranking {
            RankingStrategy::LeastDetour => detour_cost,
            RankingStrategy::WeightedCost => {
                detour_cost
                    + summary.stops.len() as f64 * self.settings.matching.stop_weight
                    + f64::from(summary.occupancy.seats) * self.settings.matching.occupancy_weight
            }
        }
    }

    async fn quote(
        &self,
        request: &RideRequest,
        now: DateTime<Utc>,
        pool_size: usize,
        detour_fraction: f64,
    ) -> Result<Quote, GatewayError> {
        let region = Region::containing(&request.pickup, self.settings.demand.region_cell_deg);
        let bucket = TimeBucket::containing(now, self.settings.demand.bucket_minutes);
        let demand = self.demand.current_demand(&region, &bucket).await?;

        let distance_km = request.direct_distance_km();
        let duration_min = f64::from(self.optimizer.estimate_duration(distance_km));
        let ctx = QuoteContext {
            demand,
            hour: now.hour(),
            pool_size,
            detour_fraction,
        };
        Ok(self.pricing.quote(distance_km, duration_min, &ctx))
    }

    fn apply_quote(&self, pool: &mut RidePool, quote: &Quote) {
        pool.pricing.base_price = quote.base_price;
        pool.pricing.surge_factor = quote.surge_factor;
        pool.pricing.pooling_discount = quote.pooling_discount;
        self.pricing.rebalance(pool);
    }
}

fn stops_for(request: &RideRequest) -> (Stop, Stop) {
    (
        Stop::pickup(request.id, request.pickup),
        Stop::dropoff(request.id, request.dropoff),
    )
}

fn passenger(
    request: &RideRequest,
    quote: &Quote,
    detour_fraction: f64,
    now: DateTime<Utc>,
) -> PoolPassenger {
    PoolPassenger {
        request_id: request.id,
        requester: request.requester.clone(),
        price: quote.price,
        solo_price: quote.solo_price,
        seats: request.passenger_count,
        luggage: request.luggage_count,
        detour_fraction,
        status: PassengerStatus::Confirmed,
        joined_at: now,
    }
}

fn price_of(pool: &RidePool, request_id: RequestId) -> f64 {
    pool.confirmed_passengers()
        .find(|p| p.request_id == request_id)
        .map_or(0.0, |p| p.price)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::domain::{
        Demand, FixedClock, GeoPoint, InMemoryDemandSource, PoolRegistry, RequestRegistry,
    };
    use crate::lock::InMemoryLockStore;

    const SFO: GeoPoint = GeoPoint::new(-122.3789, 37.6213);
    const CIVIC_CENTER: GeoPoint = GeoPoint::new(-122.4194, 37.7749);
    const UNION_SQUARE: GeoPoint = GeoPoint::new(-122.4089, 37.7858);
    const OAKLAND: GeoPoint = GeoPoint::new(-122.2711, 37.8044);

    struct Fixture {
        coordinator: MatchingCoordinator,
        pools: Arc<PoolRegistry>,
        requests: Arc<RequestRegistry>,
        locks: Arc<InMemoryLockStore>,
        clock: Arc<FixedClock>,
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn test_settings() -> MatchingSettings {
        let mut settings = MatchingSettings::default();
        settings.lock.max_retries = 1;
        settings.lock.retry_delay = std::time::Duration::from_millis(1);
        settings
    }

    fn build(
        pools: Arc<dyn PoolRepository>,
        registry: Arc<PoolRegistry>,
        demand: Arc<dyn DemandSource>,
        settings: MatchingSettings,
    ) -> Fixture {
        let requests = Arc::new(RequestRegistry::new());
        let locks = Arc::new(InMemoryLockStore::new());
        let clock = Arc::new(FixedClock::new(noon()));
        let coordinator = MatchingCoordinator::new(
            pools,
            Arc::clone(&requests) as Arc<dyn RequestRepository>,
            demand,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            EventBus::new(64),
            settings,
        );
        Fixture {
            coordinator,
            pools: registry,
            requests,
            locks,
            clock,
        }
    }

    fn fixture_with(pools: Arc<dyn PoolRepository>, registry: Arc<PoolRegistry>) -> Fixture {
        build(
            pools,
            registry,
            Arc::new(InMemoryDemandSource::new(Demand::new(0, 10))),
            test_settings(),
        )
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(PoolRegistry::new());
        fixture_with(Arc::clone(&registry) as Arc<dyn PoolRepository>, registry)
    }

    fn request(requester: &str, pickup: GeoPoint, dropoff: GeoPoint, seats: u32) -> RideRequest {
        RideRequest::new(
            requester,
            pickup,
            dropoff,
            seats,
            0,
            0.3,
            noon(),
            noon() + Duration::minutes(10),
        )
    }

    async fn seed_sfo_pair(f: &Fixture) -> (RideAssignment, RideAssignment) {
        let Ok(a) = f
            .coordinator
            .process_ride_request(request("alice", SFO, CIVIC_CENTER, 1))
            .await
        else {
            panic!("first request failed");
        };
        let Ok(b) = f
            .coordinator
            .process_ride_request(request("bob", SFO, UNION_SQUARE, 1))
            .await
        else {
            panic!("second request failed");
        };
        (a, b)
    }

    #[tokio::test]
    async fn airport_riders_share_a_pool() {
        let f = fixture();
        let mut events = f.coordinator.event_bus().subscribe();
        let (a, b) = seed_sfo_pair(&f).await;

        assert!(a.is_new_pool);
        assert!(!b.is_new_pool);
        assert_eq!(a.pool_id, b.pool_id);
        assert!(b.detour_fraction <= 0.3);

        let Ok(pool) = f.coordinator.pool_snapshot(a.pool_id).await else {
            panic!("pool missing");
        };
        assert_eq!(pool.occupancy.seats, 2);
        assert_eq!(pool.status, PoolStatus::Matched);
        assert_eq!(pool.stops.len(), 4);
        assert_eq!(pool.version, 2);
        assert!(pool.check_invariants().is_ok());

        let solo: f64 = pool.confirmed_passengers().map(|p| p.solo_price).sum();
        let paid: f64 = pool.confirmed_passengers().map(|p| p.price).sum();
        assert!(paid <= 0.85 * solo + 1e-9);

        let Ok(stored) = f.requests.load(b.request_id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Matched);
        assert_eq!(stored.matched_pool_id, Some(a.pool_id));

        let Ok(first) = events.recv().await else {
            panic!("no event");
        };
        assert_eq!(first.event_type_str(), "pool_created");
        let Ok(second) = events.recv().await else {
            panic!("no event");
        };
        assert_eq!(second.event_type_str(), "passenger_joined");
    }

    #[tokio::test]
    async fn distant_pickup_opens_new_pool() {
        let f = fixture();
        let (a, _) = seed_sfo_pair(&f).await;
        let Ok(c) = f
            .coordinator
            .process_ride_request(request("carol", OAKLAND, CIVIC_CENTER, 1))
            .await
        else {
            panic!("request failed");
        };
        assert!(c.is_new_pool);
        assert_ne!(c.pool_id, a.pool_id);
        assert_eq!(f.pools.len().await, 2);
    }

    #[tokio::test]
    async fn reverse_direction_exceeds_detour_tolerance() {
        let f = fixture();
        let Ok(a) = f
            .coordinator
            .process_ride_request(request("alice", SFO, CIVIC_CENTER, 1))
            .await
        else {
            panic!("request failed");
        };
        let mut tight = request("dave", SFO, OAKLAND, 1);
        tight.detour_tolerance = 0.05;
        let Ok(d) = f.coordinator.process_ride_request(tight).await else {
            panic!("request failed");
        };
        assert!(d.is_new_pool);
        assert_ne!(d.pool_id, a.pool_id);
    }

    #[tokio::test]
    async fn full_pool_is_skipped() {
        let f = fixture();
        let Ok(a) = f
            .coordinator
            .process_ride_request(request("alice", SFO, CIVIC_CENTER, 3))
            .await
        else {
            panic!("request failed");
        };
        let Ok(b) = f
            .coordinator
            .process_ride_request(request("bob", SFO, UNION_SQUARE, 2))
            .await
        else {
            panic!("request failed");
        };
        assert!(b.is_new_pool);
        assert_ne!(a.pool_id, b.pool_id);
    }

    #[tokio::test]
    async fn expired_request_is_rejected_and_marked() {
        let f = fixture();
        let req = request("erin", SFO, CIVIC_CENTER, 1);
        let id = req.id;
        f.clock.advance(Duration::minutes(11));

        let result = f.coordinator.process_ride_request(req).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
        let Ok(stored) = f.requests.load(id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Expired);
        assert!(f.pools.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_request_is_rejected_before_storage() {
        let f = fixture();
        let req = request("frank", GeoPoint::new(200.0, 0.0), CIVIC_CENTER, 1);
        let id = req.id;
        let result = f.coordinator.process_ride_request(req).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert!(f.requests.load(id).await.is_err());
    }

    #[tokio::test]
    async fn cancelling_sole_passenger_closes_pool() {
        let f = fixture();
        let Ok(a) = f
            .coordinator
            .process_ride_request(request("alice", SFO, CIVIC_CENTER, 1))
            .await
        else {
            panic!("request failed");
        };

        let Ok(pool) = f.coordinator.cancel_ride("alice", a.pool_id).await else {
            panic!("cancel failed");
        };
        assert_eq!(pool.status, PoolStatus::Cancelled);
        assert_eq!(pool.occupancy, Load::new(0, 0));
        assert!(pool.stops.is_empty());
        assert_eq!(pool.passengers.len(), 1);

        let Ok(stored) = f.requests.load(a.request_id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_one_of_two_keeps_pool_consistent() {
        let f = fixture();
        let (a, _) = seed_sfo_pair(&f).await;

        let Ok(pool) = f.coordinator.cancel_ride("bob", a.pool_id).await else {
            panic!("cancel failed");
        };
        assert_eq!(pool.occupancy.seats, 1);
        assert_eq!(pool.stops.len(), 2);
        assert_eq!(pool.status, PoolStatus::Matched);
        assert_eq!(pool.version, 3);
        assert!(pool.check_invariants().is_ok());
        assert!(pool.stops.iter().all(|s| s.request_id == a.request_id));
    }

    #[tokio::test]
    async fn cancel_errors_distinguish_absent_and_departed() {
        let f = fixture();
        let (a, _) = seed_sfo_pair(&f).await;

        assert!(f.coordinator.cancel_ride("bob", a.pool_id).await.is_ok());
        assert!(matches!(
            f.coordinator.cancel_ride("bob", a.pool_id).await,
            Err(GatewayError::AlreadyRemoved { .. })
        ));
        assert!(matches!(
            f.coordinator.cancel_ride("zoe", a.pool_id).await,
            Err(GatewayError::PassengerNotFound { .. })
        ));
        assert!(matches!(
            f.coordinator.cancel_ride("alice", PoolId::new()).await,
            Err(GatewayError::PoolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn held_lock_surfaces_timeout() {
        let f = fixture();
        let (a, _) = seed_sfo_pair(&f).await;
        let key = PoolLockManager::lock_key(a.pool_id);
        let Ok(Some(_token)) = f
            .locks
            .try_acquire(&key, std::time::Duration::from_secs(30))
            .await
        else {
            panic!("could not take lock");
        };

        let Err(err) = f.coordinator.cancel_ride("alice", a.pool_id).await else {
            panic!("cancel ran without the lock");
        };
        assert!(matches!(err, GatewayError::LockTimeout { attempts: 2, .. }));
        let Ok(pool) = f.coordinator.pool_snapshot(a.pool_id).await else {
            panic!("pool missing");
        };
        assert_eq!(pool.confirmed_count(), 2);
    }

    #[tokio::test]
    async fn least_detour_ranking_ignores_occupancy() {
        let f = fixture();
        let summary = PoolSummary {
            pool_id: PoolId::new(),
            status: PoolStatus::Matched,
            stops: Vec::new(),
            capacity: Load::new(4, 4),
            occupancy: Load::new(3, 0),
            version: 1,
        };
        let weighted = f.coordinator.cost(&summary, 0.1);
        assert!((weighted - (10.0 + 15.0)).abs() < 1e-9);

        let mut coordinator = f.coordinator.clone();
        coordinator.settings.matching.ranking = RankingStrategy::LeastDetour;
        assert!((coordinator.cost(&summary, 0.1) - 10.0).abs() < 1e-9);
    }

    /// Pool store whose first `failures` writes report a concurrent update.
    #[derive(Debug)]
    struct ContendedPools {
        inner: Arc<PoolRegistry>,
        failures: AtomicU32,
    }

    #[async_trait]
    impl PoolRepository for ContendedPools {
        async fn find_nearby(
            &self,
            point: GeoPoint,
            radius_km: f64,
            min_seats: u32,
            min_luggage: u32,
        ) -> Result<Vec<PoolSummary>, GatewayError> {
            self.inner
                .find_nearby(point, radius_km, min_seats, min_luggage)
                .await
        }

        async fn load(&self, id: PoolId) -> Result<RidePool, GatewayError> {
            self.inner.load(id).await
        }

        async fn save(&self, pool: RidePool, expected: u64) -> Result<RidePool, GatewayError> {
            if expected > 0
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(GatewayError::ConcurrencyConflict {
                    pool_id: *pool.id.as_uuid(),
                    expected,
                    found: expected + 1,
                });
            }
            self.inner.save(pool, expected).await
        }
    }

    fn contended(failures: u32) -> Fixture {
        let registry = Arc::new(PoolRegistry::new());
        let pools = Arc::new(ContendedPools {
            inner: Arc::clone(&registry),
            failures: AtomicU32::new(failures),
        });
        fixture_with(pools, registry)
    }

    #[tokio::test]
    async fn single_version_conflict_is_retried() {
        let f = contended(1);
        let (a, b) = seed_sfo_pair(&f).await;
        assert_eq!(a.pool_id, b.pool_id);
        assert_eq!(b.pool_version, 2);
    }

    #[tokio::test]
    async fn repeated_version_conflict_is_surfaced() {
        let f = contended(2);
        let Ok(a) = f
            .coordinator
            .process_ride_request(request("alice", SFO, CIVIC_CENTER, 1))
            .await
        else {
            panic!("request failed");
        };
        let bob = request("bob", SFO, UNION_SQUARE, 1);
        let bob_id = bob.id;
        let result = f.coordinator.process_ride_request(bob).await;
        let Err(err) = result else {
            panic!("conflict swallowed");
        };
        assert!(matches!(err, GatewayError::ConcurrencyConflict { .. }));
        assert!(err.is_retryable());

        // Contention leaves the request pending until it expires.
        let Ok(stored) = f.requests.load(bob_id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Pending);

        // The lock was released on the error path.
        assert!(f.coordinator.cancel_ride("alice", a.pool_id).await.is_ok());
    }

    #[tokio::test]
    async fn six_bags_fit_the_default_vehicle() {
        let f = fixture();
        let mut req = request("gina", SFO, CIVIC_CENTER, 1);
        req.luggage_count = 6;
        let id = req.id;

        let Ok(assignment) = f.coordinator.process_ride_request(req).await else {
            panic!("six-bag request was not placed");
        };
        assert!(assignment.is_new_pool);
        let Ok(stored) = f.requests.load(id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Matched);
    }

    #[tokio::test]
    async fn request_larger_than_vehicle_is_rejected_before_storage() {
        let mut settings = test_settings();
        settings.matching.vehicle_capacity = Load::new(4, 4);
        let registry = Arc::new(PoolRegistry::new());
        let f = build(
            Arc::clone(&registry) as Arc<dyn PoolRepository>,
            registry,
            Arc::new(InMemoryDemandSource::new(Demand::new(0, 10))),
            settings,
        );
        let mut req = request("hugo", SFO, CIVIC_CENTER, 1);
        req.luggage_count = 6;
        let id = req.id;

        let Err(GatewayError::Validation(msg)) = f.coordinator.process_ride_request(req).await
        else {
            panic!("oversized request accepted");
        };
        assert!(msg.contains(&id.to_string()));
        assert!(f.requests.load(id).await.is_err());
        assert!(f.pools.is_empty().await);
    }

    #[derive(Debug)]
    struct OfflineDemand;

    #[async_trait]
    impl DemandSource for OfflineDemand {
        async fn current_demand(
            &self,
            _region: &Region,
            _bucket: &TimeBucket,
        ) -> Result<Demand, GatewayError> {
            Err(GatewayError::Persistence("demand store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_matching_cancels_the_stored_request() {
        let registry = Arc::new(PoolRegistry::new());
        let f = build(
            Arc::clone(&registry) as Arc<dyn PoolRepository>,
            registry,
            Arc::new(OfflineDemand),
            test_settings(),
        );
        let req = request("ivan", SFO, CIVIC_CENTER, 1);
        let id = req.id;

        let result = f.coordinator.process_ride_request(req).await;
        assert!(matches!(result, Err(GatewayError::Persistence(_))));
        let Ok(stored) = f.requests.load(id).await else {
            panic!("request missing");
        };
        assert_eq!(stored.status, RequestStatus::Cancelled);
        assert!(f.pools.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn join_and_cancel_on_one_pool_never_interleave() {
        let mut settings = test_settings();
        settings.lock.max_retries = 500;
        settings.lock.retry_delay = std::time::Duration::from_millis(2);
        let registry = Arc::new(PoolRegistry::new());
        let f = build(
            Arc::clone(&registry) as Arc<dyn PoolRepository>,
            registry,
            Arc::new(InMemoryDemandSource::new(Demand::new(0, 10))),
            settings,
        );
        let (a, _) = seed_sfo_pair(&f).await;
        let mut events = f.coordinator.event_bus().subscribe();

        let join = {
            let coordinator = f.coordinator.clone();
            let carol = request("carol", SFO, UNION_SQUARE, 1);
            tokio::spawn(async move { coordinator.process_ride_request(carol).await })
        };
        let cancel = {
            let coordinator = f.coordinator.clone();
            let pool_id = a.pool_id;
            tokio::spawn(async move { coordinator.cancel_ride("bob", pool_id).await })
        };
        let (Ok(Ok(joined)), Ok(Ok(_))) = tokio::join!(join, cancel) else {
            panic!("racing mutation failed");
        };
        assert_eq!(joined.pool_id, a.pool_id);

        let Ok(pool) = f.coordinator.pool_snapshot(a.pool_id).await else {
            panic!("pool missing");
        };
        assert_eq!(pool.version, 4);
        assert_eq!(pool.confirmed_count(), 2);
        assert_eq!(pool.occupancy.seats, 2);
        assert!(pool.check_invariants().is_ok());
        assert!(
            pool.confirmed_passengers()
                .all(|p| p.requester == "alice" || p.requester == "carol")
        );

        let mut versions = Vec::new();
        while let Ok(event) = events.try_recv() {
            versions.push(event.version());
        }
        assert_eq!(versions, vec![3, 4]);
    }
}
