//! End-to-end matching scenarios against the in-memory stores.

#![allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_test::assert_ok;

use ridepool_gateway::config::MatchingSettings;
use ridepool_gateway::domain::{
    Demand, EventBus, FixedClock, GeoPoint, InMemoryDemandSource, PoolRegistry, PoolStatus,
    RequestRegistry, RequestStatus, RideRequest,
};
use ridepool_gateway::domain::RequestRepository;
use ridepool_gateway::lock::InMemoryLockStore;
use ridepool_gateway::service::MatchingCoordinator;

const SFO: GeoPoint = GeoPoint::new(-122.3789, 37.6213);
const CIVIC_CENTER: GeoPoint = GeoPoint::new(-122.4194, 37.7749);
const UNION_SQUARE: GeoPoint = GeoPoint::new(-122.4089, 37.7858);

fn coordinator(requests: Arc<RequestRegistry>) -> MatchingCoordinator {
    let mut settings = MatchingSettings::default();
    settings.lock.max_retries = 200;
    settings.lock.retry_delay = Duration::from_millis(2);
    settings.matching.max_join_attempts = 10;
    MatchingCoordinator::new(
        Arc::new(PoolRegistry::new()),
        requests,
        Arc::new(InMemoryDemandSource::new(Demand::new(2, 10))),
        Arc::new(InMemoryLockStore::new()),
        Arc::new(FixedClock::new(Utc::now())),
        EventBus::new(256),
        settings,
    )
}

fn airport_request(requester: String, dropoff: GeoPoint) -> RideRequest {
    let now = Utc::now();
    RideRequest::new(
        requester,
        SFO,
        dropoff,
        1,
        1,
        0.3,
        now,
        now + chrono::Duration::minutes(30),
    )
}

#[tokio::test]
async fn second_airport_rider_joins_first_pool() {
    let requests = Arc::new(RequestRegistry::new());
    let coordinator = coordinator(Arc::clone(&requests));

    let a = assert_ok!(
        coordinator
            .process_ride_request(airport_request("alice".into(), CIVIC_CENTER))
            .await
    );
    let b = assert_ok!(
        coordinator
            .process_ride_request(airport_request("bob".into(), UNION_SQUARE))
            .await
    );
    assert_eq!(a.pool_id, b.pool_id);

    let pool = assert_ok!(coordinator.pool_snapshot(a.pool_id).await);
    assert_eq!(pool.occupancy.seats, 2);
    assert_eq!(pool.occupancy.luggage, 2);
    assert_eq!(pool.status, PoolStatus::Matched);
    assert!(pool.estimated_duration_min > 0);
    assert_ok!(pool.check_invariants());

    let closed = assert_ok!(coordinator.cancel_ride("alice", a.pool_id).await);
    assert_eq!(closed.confirmed_count(), 1);
    let closed = assert_ok!(coordinator.cancel_ride("bob", a.pool_id).await);
    assert_eq!(closed.status, PoolStatus::Cancelled);
    assert_eq!(closed.occupancy.seats, 0);
    assert_eq!(
        requests.count_with_status(RequestStatus::Cancelled).await,
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_riders_never_overfill_a_pool() {
    let requests = Arc::new(RequestRegistry::new());
    let coordinator = Arc::new(coordinator(Arc::clone(&requests)));

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let dropoff = if i % 2 == 0 { CIVIC_CENTER } else { UNION_SQUARE };
            tokio::spawn(async move {
                coordinator
                    .process_ride_request(airport_request(format!("rider-{i}"), dropoff))
                    .await
            })
        })
        .collect();

    let mut pool_ids = HashSet::new();
    let mut request_ids = HashSet::new();
    for handle in handles {
        let Ok(result) = handle.await else {
            panic!("task panicked");
        };
        let assignment = assert_ok!(result);
        pool_ids.insert(assignment.pool_id);
        request_ids.insert(assignment.request_id);
    }
    assert_eq!(request_ids.len(), 12);
    // Four seats per vehicle: twelve riders need at least three pools.
    assert!(pool_ids.len() >= 3);

    let mut seated = 0;
    for id in &pool_ids {
        let pool = assert_ok!(coordinator.pool_snapshot(*id).await);
        assert_ok!(pool.check_invariants());
        assert!(pool.occupancy.seats <= pool.capacity.seats);
        assert!(pool.occupancy.luggage <= pool.capacity.luggage);
        seated += pool.occupancy.seats;
    }
    assert_eq!(seated, 12);

    for id in &request_ids {
        let stored = assert_ok!(requests.load(*id).await);
        assert_eq!(stored.status, RequestStatus::Matched);
        assert!(stored.matched_pool_id.is_some_and(|p| pool_ids.contains(&p)));
    }
}
