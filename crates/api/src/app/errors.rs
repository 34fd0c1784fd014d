use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, warn};

use ewallet_core::DomainError;
use ewallet_infra::{CoordinatorError, ErrorKind, StoreError};

pub fn coordinator_error_to_response(err: CoordinatorError) -> axum::response::Response {
    match err.kind() {
        ErrorKind::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ErrorKind::InsufficientFunds => {
            json_error(StatusCode::BAD_REQUEST, "insufficient_funds", err.to_string())
        }
        ErrorKind::LimitExceeded => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "balance_limit_exceeded", err.to_string())
        }
        ErrorKind::Timeout => json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", err.to_string()),
        ErrorKind::Cancelled => json_error(StatusCode::SERVICE_UNAVAILABLE, "cancelled", err.to_string()),
        // Already logged by the coordinator; do not leak store details.
        ErrorKind::Internal => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        err @ DomainError::InsufficientFunds { .. } => {
            json_error(StatusCode::BAD_REQUEST, "insufficient_funds", err.to_string())
        }
        err @ DomainError::LimitExceeded { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "balance_limit_exceeded", err.to_string())
        }
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::LockTimeout(_) => {
            warn!(error = %err, "store call timed out");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", err.to_string())
        }
        StoreError::Unavailable(_) => {
            error!(error = %err, "store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "store unavailable")
        }
        other => {
            error!(error = %other, "store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
