//! Pool inspection and passenger cancellation handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::api::dto::PoolDetailResponse;
use crate::app_state::AppState;
use crate::domain::PoolId;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /pools/:id` — Get pool details.
///
/// # Errors
///
/// Returns [`GatewayError::PoolNotFound`] if the pool does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/pools/{id}",
    tag = "Pools",
    summary = "Get pool details",
    description = "Returns the committed route, passengers, occupancy, pricing, and version of a pool.",
    params(
        ("id" = uuid::Uuid, Path, description = "Pool UUID"),
    ),
    responses(
        (status = 200, description = "Pool details", body = PoolDetailResponse),
        (status = 404, description = "Pool not found", body = ErrorResponse),
    )
)]
pub async fn get_pool(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let pool = state
        .coordinator
        .pool_snapshot(PoolId::from_uuid(id))
        .await?;
    Ok(Json(PoolDetailResponse::from(&pool)))
}

/// `DELETE /pools/:id/passengers/:requester` — Cancel a rider's seat.
///
/// # Errors
///
/// Returns [`GatewayError`] if the pool or passenger is unknown, the rider
/// already left, or the pool lock stays busy.
#[utoipa::path(
    delete,
    path = "/api/v1/pools/{id}/passengers/{requester}",
    tag = "Pools",
    summary = "Cancel a passenger",
    description = "Removes the rider's stops, re-prices the remaining passengers, and closes the pool when it empties.",
    params(
        ("id" = uuid::Uuid, Path, description = "Pool UUID"),
        ("requester" = String, Path, description = "Rider reference"),
    ),
    responses(
        (status = 200, description = "Pool after cancellation", body = PoolDetailResponse),
        (status = 400, description = "Pool no longer open", body = ErrorResponse),
        (status = 404, description = "Pool or passenger not found", body = ErrorResponse),
        (status = 409, description = "Rider already left or concurrent update", body = ErrorResponse),
        (status = 503, description = "Pool lock busy, retry", body = ErrorResponse),
    )
)]
pub async fn cancel_passenger(
    State(state): State<AppState>,
    Path((id, requester)): Path<(uuid::Uuid, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let pool = state
        .coordinator
        .cancel_ride(&requester, PoolId::from_uuid(id))
        .await?;
    Ok(Json(PoolDetailResponse::from(&pool)))
}

/// Pool routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools/{id}", get(get_pool))
        .route("/pools/{id}/passengers/{requester}", delete(cancel_passenger))
}
