//! Append-only, per-aggregate event log with optimistic concurrency control.
//!
//! Every aggregate stream is a gapless sequence of versions starting at 1.
//! Writers name the version they read; the store commits only if nobody
//! else committed in between, and reports a lost race as
//! [`EventStoreError::ConcurrencyConflict`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, NewEvent, Sequence, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{EventStore, EventStoreExt, EventStream};
