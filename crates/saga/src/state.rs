//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout or return saga.
///
/// State transitions:
/// ```text
/// Validating ──► Reserving ──► Recording ──► Published
///      │             │             │
///      └─────────────┴─────────────┴──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Checking the member (checkout) or the active loan (return).
    #[default]
    Validating,

    /// Changing the item's available count.
    Reserving,

    /// Appending to the checkout aggregate.
    Recording,

    /// All steps committed (terminal state).
    Published,

    /// A step failed and committed steps are being undone.
    Compensating,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the run may move from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Validating, Reserving) | (Reserving, Recording) | (Recording, Published) => true,
            (Compensating, Failed) => true,
            (from, Compensating) => !from.is_terminal() && *from != Compensating,
            _ => false,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Published | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Validating => "Validating",
            SagaState::Reserving => "Reserving",
            SagaState::Recording => "Recording",
            SagaState::Published => "Published",
            SagaState::Compensating => "Compensating",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
