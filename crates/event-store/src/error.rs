use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer committed to the aggregate first.
    ///
    /// `actual` is `None` when the conflict was detected by the
    /// `(aggregate_id, version)` unique constraint or by a serialization
    /// failure rather than by the explicit version check.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {}",
        .actual.map(|v| v.to_string()).unwrap_or_else(|| "a concurrent commit".to_string())
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Option<Version>,
    },

    /// The append request was malformed (empty batch, negative version).
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// The backend refused the operation (connection loss, injected fault).
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true for the expected, business-significant conflict outcome.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
