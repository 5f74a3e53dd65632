//! Ride intake handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{RideAssignmentResponse, RideRequestDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /rides` — Match a ride request to a pool.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid or expired requests and on lock or
/// version contention.
#[utoipa::path(
    post,
    path = "/api/v1/rides",
    tag = "Rides",
    summary = "Request a shared ride",
    description = "Validates the request, joins the cheapest nearby pool within the rider's detour tolerance, or opens a new pool.",
    request_body = RideRequestDto,
    responses(
        (status = 201, description = "Request assigned to a pool", body = RideAssignmentResponse),
        (status = 400, description = "Invalid, expired, or larger than a vehicle", body = ErrorResponse),
        (status = 409, description = "Concurrent update, retry", body = ErrorResponse),
        (status = 503, description = "Pool lock busy, retry", body = ErrorResponse),
    )
)]
pub async fn request_ride(
    State(state): State<AppState>,
    Json(req): Json<RideRequestDto>,
) -> Result<impl IntoResponse, GatewayError> {
    let coordinator = &state.coordinator;
    let request = req.into_request(
        coordinator.now(),
        coordinator.settings().matching.request_ttl,
    );
    let assignment = coordinator.process_ride_request(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(RideAssignmentResponse::from(assignment)),
    ))
}

/// Ride intake routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/rides", post(request_ride))
}
