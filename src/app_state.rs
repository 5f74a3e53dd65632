//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::MatchingCoordinator;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Matching coordinator for all business logic.
    pub coordinator: Arc<MatchingCoordinator>,
    /// Event bus the event-log task subscribes to.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wraps a coordinator, sharing its event bus.
    #[must_use]
    pub fn new(coordinator: MatchingCoordinator) -> Self {
        let event_bus = coordinator.event_bus().clone();
        Self {
            coordinator: Arc::new(coordinator),
            event_bus,
        }
    }
}
