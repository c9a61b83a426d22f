//! Projection error types.

use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A read-model query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row would break a read-model invariant and was not written.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// An event arrived for a row that was never created.
    #[error("Missing row for {aggregate_type} {aggregate_id}")]
    MissingRow {
        aggregate_type: &'static str,
        aggregate_id: String,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
