//! Domain layer: pool aggregate, requests, events, and storage contracts.
//!
//! This module holds the server-side model (ride requests, ride pools,
//! geographic points), the event bus for committed mutations, the traits
//! the matching core consumes, and their in-memory implementations.

pub mod clock;
pub mod demand;
pub mod event_bus;
pub mod geo;
pub mod ids;
pub mod pool_event;
pub mod pool_registry;
pub mod ports;
pub mod request_registry;
pub mod ride_pool;
pub mod ride_request;

pub use clock::{FixedClock, SystemClock};
pub use demand::{Demand, InMemoryDemandSource, Region, TimeBucket};
pub use event_bus::EventBus;
pub use geo::GeoPoint;
pub use ids::{PoolId, RequestId};
pub use pool_event::PoolEvent;
pub use pool_registry::PoolRegistry;
pub use ports::{Clock, DemandSource, PoolRepository, RequestRepository};
pub use request_registry::RequestRegistry;
pub use ride_pool::{
    Load, PassengerStatus, PoolPassenger, PoolStatus, PoolSummary, PricingSnapshot, RidePool,
    Stop, StopKind,
};
pub use ride_request::{RequestStatus, RideRequest};
