//! Shared identifier types for the circulation workspace.

mod types;

pub use types::{AggregateId, MemberId};
