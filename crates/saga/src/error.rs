//! Saga error types.

use common::AggregateId;
use domain::DomainError;
use projections::ProjectionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::SagaState;

/// Coarse classification of a saga failure, used by callers to decide how
/// to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Someone else changed the aggregate first. Not retried.
    ConcurrencyConflict,
    /// The member, item or checkout does not exist.
    NotFound,
    /// A business rule rejected the request.
    ValidationFailed,
    /// Storage, network or deadline failure.
    InfrastructureFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ConcurrencyConflict => "concurrency_conflict",
            FailureKind::NotFound => "not_found",
            FailureKind::ValidationFailed => "validation_failed",
            FailureKind::InfrastructureFailure => "infrastructure_failure",
        }
    }

    /// Classifies a domain error.
    pub fn of_domain(error: &DomainError) -> Self {
        if error.is_concurrency_conflict() {
            FailureKind::ConcurrencyConflict
        } else if error.is_not_found() {
            FailureKind::NotFound
        } else if error.is_rejection() {
            FailureKind::ValidationFailed
        } else {
            FailureKind::InfrastructureFailure
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by inventory and membership capabilities.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrency conflict on item {item_id}")]
    ConcurrencyConflict { item_id: AggregateId },

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl CapabilityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CapabilityError::NotFound { .. } => FailureKind::NotFound,
            CapabilityError::ConcurrencyConflict { .. } => FailureKind::ConcurrencyConflict,
            CapabilityError::Rejected(_) => FailureKind::ValidationFailed,
            CapabilityError::Unavailable(_) | CapabilityError::Http(_) => {
                FailureKind::InfrastructureFailure
            }
            CapabilityError::Domain(e) => FailureKind::of_domain(e),
        }
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A business rule rejected the request.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Nothing to act on.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The run tried to move between states that are not connected.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// The caller's deadline passed while a step was running.
    #[error("Deadline exceeded during {step}")]
    DeadlineExceeded { step: SagaState },

    /// Capability error.
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Read-model error.
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

impl SagaError {
    /// Returns the failure classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            SagaError::ValidationFailed(_) => FailureKind::ValidationFailed,
            SagaError::NotFound(_) => FailureKind::NotFound,
            SagaError::InvalidTransition { .. } | SagaError::DeadlineExceeded { .. } => {
                FailureKind::InfrastructureFailure
            }
            SagaError::Capability(e) => e.kind(),
            SagaError::Domain(e) => FailureKind::of_domain(e),
            SagaError::Projection(ProjectionError::InvalidRow(_)) => FailureKind::ValidationFailed,
            SagaError::Projection(_) => FailureKind::InfrastructureFailure,
        }
    }

    /// Returns true if the outcome of the failed step is unknown: it may
    /// have committed before the error surfaced.
    pub fn outcome_unknown(&self) -> bool {
        self.kind() == FailureKind::InfrastructureFailure
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
