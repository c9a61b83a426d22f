//! Core projection trait.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// A projection that processes events and updates a read model.
///
/// Events are delivered in global sequence order, and the same event may be
/// delivered more than once (after a restart from an older checkpoint, or
/// when the saga already wrote the row). `handle` must treat an event whose
/// version is not newer than the row's as a no-op.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection. Used as the checkpoint key.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
