//! System endpoints: health check and strategy catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::config::{PricingStrategy, RankingStrategy};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// One configurable strategy family.
#[derive(Debug, Serialize, ToSchema)]
struct StrategyInfo {
    active: &'static str,
    available: Vec<&'static str>,
}

/// Active and available strategies.
#[derive(Debug, Serialize, ToSchema)]
struct StrategiesResponse {
    ranking: StrategyInfo,
    pricing: StrategyInfo,
    search_radius_km: f64,
    max_join_attempts: u32,
}

/// `GET /config/strategies` — Matching and pricing strategies.
#[utoipa::path(
    get,
    path = "/config/strategies",
    tag = "System",
    summary = "List strategies",
    description = "Returns the active ranking and pricing strategies and the alternatives the gateway supports.",
    responses(
        (status = 200, description = "Strategy catalog", body = StrategiesResponse),
    )
)]
pub async fn strategies_handler(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.coordinator.settings();
    let response = StrategiesResponse {
        ranking: StrategyInfo {
            active: settings.matching.ranking.as_str(),
            available: [RankingStrategy::WeightedCost, RankingStrategy::LeastDetour]
                .iter()
                .map(RankingStrategy::as_str)
                .collect(),
        },
        pricing: StrategyInfo {
            active: settings.pricing.strategy.as_str(),
            available: [PricingStrategy::Dynamic, PricingStrategy::Standard]
                .iter()
                .map(PricingStrategy::as_str)
                .collect(),
        },
        search_radius_km: settings.matching.search_radius_km,
        max_join_attempts: settings.matching.max_join_attempts,
    };
    (StatusCode::OK, Json(response))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/strategies", get(strategies_handler))
}
