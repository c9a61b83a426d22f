//! Checkout and return sagas for the circulation service.
//!
//! Each saga call runs as a small state machine over three steps:
//! 1. Validate the member (or find the active checkout, for returns)
//! 2. Change the item's available count with a compare-and-set
//! 3. Record the change on the checkout's own stream
//!
//! Steps that commit durable state bind a [`Compensation`]. If a later step
//! fails, the bound compensations run in reverse order and the run ends in
//! [`SagaState::Failed`]. Runs are never persisted: a crash between a
//! committed step and its compensation needs an external reconciliation.

pub mod capability;
pub mod circulation;
pub mod compensation;
pub mod config;
pub mod deadline;
pub mod error;
pub mod run;
pub mod state;

pub use capability::{
    HttpCapabilityConfig, HttpInventoryClient, HttpMembershipClient, InMemoryMembership,
    InventoryCapability, ItemAvailability, LocalInventory, MemberInfo, MemberStatus,
    MembershipCapability,
};
pub use circulation::CirculationSaga;
pub use compensation::{Compensation, CompensationOutcome};
pub use config::SagaConfig;
pub use deadline::Deadline;
pub use error::{CapabilityError, FailureKind, Result, SagaError};
pub use run::{SagaKind, SagaReport, SagaRun};
pub use state::SagaState;
