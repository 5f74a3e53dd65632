//! # ridepool-gateway
//!
//! Shared-ride pooling service: assigns incoming ride requests to vehicle
//! pools under seat/luggage capacity and per-rider detour tolerance, and
//! prices every passenger fairly.
//!
//! Route arithmetic uses great-circle distances; there is no road network.
//! Concurrent writers to the same pool are serialized by a per-pool lock
//! and, independently, by an optimistic version check on every write.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── MatchingCoordinator (service/)
//!     │     ├── RouteOptimizer
//!     │     └── PricingEngine
//!     ├── PoolLockManager (lock/)
//!     ├── EventBus → event log task
//!     │
//!     ├── Ports (domain/ports): PoolRepository, RequestRepository,
//!     │   DemandSource, Clock, LockStore
//!     │
//!     ├── In-memory stores (domain/, lock/memory)
//!     └── PostgreSQL stores (persistence/, lock/postgres)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod lock;
pub mod persistence;
pub mod service;
