//! Service layer: matching, routing, and pricing.
//!
//! [`MatchingCoordinator`] owns the request → pool workflow and delegates
//! route arithmetic to [`RouteOptimizer`] and fares to [`PricingEngine`].

pub mod event_log;
pub mod matching_coordinator;
pub mod pricing_engine;
pub mod route_optimizer;

pub use event_log::spawn_event_log;
pub use matching_coordinator::{Candidate, MatchingCoordinator, RideAssignment};
pub use pricing_engine::{Fare, PricingEngine, Quote, QuoteContext};
pub use route_optimizer::{Detour, RouteOptimizer};
