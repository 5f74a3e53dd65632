//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type. Each variant maps to a
//! numeric code, an HTTP status, and a retryability flag.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 5001,
///     "message": "could not lock pool …",
///     "retryable": true
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Whether the same call may succeed if repeated.
    pub retryable: bool,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request              |
/// | 2000–2999 | Not Found / State   | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server              | 500 Internal Server Error    |
/// | 4000–4999 | Candidate filtering | 422 Unprocessable Entity     |
/// | 5000–5999 | Contention          | 503 / 409                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed geo or capacity input, rejected before matching.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Pool with the given ID was not found.
    #[error("pool not found: {0}")]
    PoolNotFound(uuid::Uuid),

    /// Ride request with the given ID was not found.
    #[error("ride request not found: {0}")]
    RequestNotFound(uuid::Uuid),

    /// The requester never rode in the given pool.
    #[error("requester {requester} is not a passenger of pool {pool_id}")]
    PassengerNotFound {
        /// Pool searched.
        pool_id: uuid::Uuid,
        /// Requester reference.
        requester: String,
    },

    /// The cancel target already left the pool.
    #[error("requester {requester} already left pool {pool_id}")]
    AlreadyRemoved {
        /// Pool searched.
        pool_id: uuid::Uuid,
        /// Requester reference.
        requester: String,
    },

    /// The pool has no room for the request's seats or luggage.
    #[error("pool {0} lacks capacity for the request")]
    CapacityExceeded(uuid::Uuid),

    /// Joining would grow the route beyond the rider's tolerance.
    #[error("detour {detour:.3} exceeds tolerance {tolerance:.3} for pool {pool_id}")]
    DetourExceeded {
        /// Candidate pool.
        pool_id: uuid::Uuid,
        /// Computed detour fraction.
        detour: f64,
        /// Rider's tolerance.
        tolerance: f64,
    },

    /// The pool lock could not be obtained within the retry budget.
    #[error("could not lock pool {pool_id} after {attempts} attempts")]
    LockTimeout {
        /// Contended pool.
        pool_id: uuid::Uuid,
        /// Acquire attempts made.
        attempts: u32,
    },

    /// A write carried a stale version.
    #[error("pool {pool_id} changed concurrently (expected version {expected}, found {found})")]
    ConcurrencyConflict {
        /// Contended pool.
        pool_id: uuid::Uuid,
        /// Version the writer loaded.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::PoolNotFound(_) => 2001,
            Self::RequestNotFound(_) => 2002,
            Self::PassengerNotFound { .. } => 2003,
            Self::AlreadyRemoved { .. } => 2004,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::CapacityExceeded(_) => 4001,
            Self::DetourExceeded { .. } => 4002,
            Self::LockTimeout { .. } => 5001,
            Self::ConcurrencyConflict { .. } => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PoolNotFound(_) | Self::RequestNotFound(_) | Self::PassengerNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyRemoved { .. } | Self::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
            Self::CapacityExceeded(_) | Self::DetourExceeded { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient failures a caller may retry unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::ConcurrencyConflict { .. }
        )
    }

    /// Candidate rejections the coordinator absorbs by trying elsewhere.
    #[must_use]
    pub const fn is_candidate_rejection(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded(_) | Self::DetourExceeded { .. }
        )
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("stored document: {err}"))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let lock = GatewayError::LockTimeout {
            pool_id: uuid::Uuid::new_v4(),
            attempts: 5,
        };
        let conflict = GatewayError::ConcurrencyConflict {
            pool_id: uuid::Uuid::new_v4(),
            expected: 3,
            found: 4,
        };
        assert!(lock.is_retryable());
        assert!(conflict.is_retryable());
        assert_eq!(lock.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert!(!GatewayError::Validation("x".to_string()).is_retryable());
    }

    #[test]
    fn candidate_rejections_are_classified() {
        let id = uuid::Uuid::new_v4();
        assert!(GatewayError::CapacityExceeded(id).is_candidate_rejection());
        assert!(
            GatewayError::DetourExceeded {
                pool_id: id,
                detour: 0.4,
                tolerance: 0.3
            }
            .is_candidate_rejection()
        );
        assert!(!GatewayError::PoolNotFound(id).is_candidate_rejection());
    }

    #[test]
    fn response_carries_status() {
        let response = GatewayError::AlreadyRemoved {
            pool_id: uuid::Uuid::new_v4(),
            requester: "rider-1".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
