//! In-memory record of one saga execution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compensation::{Compensation, CompensationOutcome};
use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// Which business transaction a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaKind {
    Checkout,
    Return,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::Checkout => "checkout",
            SagaKind::Return => "return",
        }
    }
}

/// One saga execution: its state, the states it passed through, and the
/// compensations bound to committed forward steps.
///
/// Runs live only for the duration of a request and are never persisted.
#[derive(Debug, Clone)]
pub struct SagaRun {
    saga_id: Uuid,
    kind: SagaKind,
    state: SagaState,
    history: Vec<SagaState>,
    compensations: Vec<Compensation>,
}

impl SagaRun {
    pub fn new(kind: SagaKind) -> Self {
        Self {
            saga_id: Uuid::new_v4(),
            kind,
            state: SagaState::default(),
            history: vec![SagaState::default()],
            compensations: Vec::new(),
        }
    }

    pub fn saga_id(&self) -> Uuid {
        self.saga_id
    }

    pub fn kind(&self) -> SagaKind {
        self.kind
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[SagaState] {
        &self.history
    }

    pub fn compensations(&self) -> &[Compensation] {
        &self.compensations
    }

    /// Moves to `next`, rejecting transitions the state machine forbids.
    pub fn advance(&mut self, next: SagaState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(saga_id = %self.saga_id, from = %self.state, to = %next, "saga transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Binds a compensation to the step that just committed.
    pub fn push_compensation(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Removes and returns the bound compensations, most recent first.
    pub fn take_compensations(&mut self) -> Vec<Compensation> {
        let mut compensations = std::mem::take(&mut self.compensations);
        compensations.reverse();
        compensations
    }

    /// Finishes the run with its outcome.
    pub fn into_report<T>(
        self,
        compensations: Vec<CompensationOutcome>,
        outcome: Result<T>,
    ) -> SagaReport<T> {
        SagaReport {
            saga_id: self.saga_id,
            kind: self.kind,
            final_state: self.state,
            history: self.history,
            compensations,
            outcome,
        }
    }
}

/// Everything a finished run did, for callers that want more than the
/// result.
#[derive(Debug)]
pub struct SagaReport<T> {
    pub saga_id: Uuid,
    pub kind: SagaKind,
    pub final_state: SagaState,
    pub history: Vec<SagaState>,
    /// Compensations in the order they ran.
    pub compensations: Vec<CompensationOutcome>,
    pub outcome: Result<T>,
}

impl<T> SagaReport<T> {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Number of compensations that failed.
    pub fn compensation_failures(&self) -> usize {
        self.compensations.iter().filter(|c| !c.succeeded()).count()
    }
}
