//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Ride and pool endpoints are mounted under `/api/v1`; system endpoints
//! at the root.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// The served application: API routes plus tracing, timeout, and CORS
/// middleware, bound to `state`.
#[allow(deprecated)]
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    build_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
