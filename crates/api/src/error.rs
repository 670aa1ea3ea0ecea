//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::DispatchError;
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Dispatch engine error.
    Dispatch(DispatchError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Dispatch(err) => dispatch_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn dispatch_error_to_response(err: DispatchError) -> (StatusCode, String) {
    match &err {
        DispatchError::OfferConflict(_) => (StatusCode::CONFLICT, err.to_string()),
        DispatchError::AttemptNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DispatchError::Domain(DomainError::OrderNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        DispatchError::Domain(DomainError::InvalidStatus(_)) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Dispatch(err)
    }
}
