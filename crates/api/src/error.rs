//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{CapabilityError, FailureKind, SagaError};
use thiserror::Error;

use crate::seed::SeedError;

/// Errors raised while wiring capabilities at startup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga failure, mapped by its failure kind.
    Saga(SagaError),
}

/// HTTP status for a saga failure kind.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::ConcurrencyConflict => StatusCode::CONFLICT,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::InfrastructureFailure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, FailureKind::NotFound, msg),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, FailureKind::ValidationFailed, msg)
            }
            ApiError::Saga(err) => {
                let kind = err.kind();
                if kind == FailureKind::InfrastructureFailure {
                    tracing::error!(error = %err, "saga infrastructure failure");
                }
                (status_for(kind), kind, err.to_string())
            }
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saga_failures_map_to_status_codes() {
        let cases = [
            (SagaError::NotFound("member".into()), StatusCode::NOT_FOUND),
            (
                SagaError::ValidationFailed("no copies".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SagaError::DeadlineExceeded {
                    step: saga::SagaState::Recording,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SagaError::Capability(saga::CapabilityError::ConcurrencyConflict {
                    item_id: common::AggregateId::new(),
                }),
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_bad_request() {
        let response = ApiError::BadRequest("bad id".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
