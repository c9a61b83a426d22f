//! Caller deadlines for saga steps.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// Point in time by which a saga call must finish.
///
/// Forward steps run under [`Deadline::run`]. A step cut off by the deadline
/// is dropped, which rolls back any open store transaction, but a commit
/// that raced the cut-off may still have happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Runs `step` until it completes or the deadline passes.
    pub async fn run<F: Future>(&self, state: SagaState, step: F) -> Result<F::Output> {
        tokio::time::timeout_at(self.0, step)
            .await
            .map_err(|_| SagaError::DeadlineExceeded { step: state })
    }
}
