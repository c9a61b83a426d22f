//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::catalog::ItemError;
use crate::circulation::CheckoutError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A catalog item command was rejected.
    #[error("Item error: {0}")]
    Item(ItemError),

    /// A checkout command was rejected.
    #[error("Checkout error: {0}")]
    Checkout(CheckoutError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if another writer committed to the aggregate first.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_concurrency_conflict())
    }

    /// Returns true if the targeted aggregate has no events.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::AggregateNotFound { .. }
                | DomainError::Item(ItemError::NotFound)
                | DomainError::Checkout(CheckoutError::NotFound)
        )
    }

    /// Returns true if the error is a business rule rejection rather than
    /// a storage problem.
    pub fn is_rejection(&self) -> bool {
        !self.is_not_found() && matches!(self, DomainError::Item(_) | DomainError::Checkout(_))
    }
}

impl From<ItemError> for DomainError {
    fn from(e: ItemError) -> Self {
        DomainError::Item(e)
    }
}

impl From<CheckoutError> for DomainError {
    fn from(e: CheckoutError) -> Self {
        DomainError::Checkout(e)
    }
}
