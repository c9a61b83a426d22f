use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, NewEvent, Result, Sequence, Snapshot, Version,
};

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
///
/// An event store owns the append-only log of every aggregate. Versions and
/// global sequence ids are assigned by the store, never by callers. All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to an aggregate's stream.
    ///
    /// The append commits only if the aggregate is currently at
    /// `expected_version` (0 for a new aggregate); the events then receive
    /// versions `expected_version + 1, + 2, ...`. Either all events commit
    /// or none do. A lost race is reported as `ConcurrencyConflict`.
    ///
    /// Returns the new version of the aggregate after appending.
    async fn append(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        events: Vec<NewEvent>,
    ) -> Result<Version>;

    /// Loads an aggregate's events with `version >= from`, and
    /// `version <= to` when bounded, in ascending version order.
    ///
    /// `None` and `Some(Version::initial())` both mean "no upper bound".
    async fn load(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Option<Version>,
    ) -> Result<Vec<EventEnvelope>>;

    /// Gets the highest committed version of an aggregate, or
    /// `Version::initial()` when it has no events.
    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Version>;

    /// Returns up to `batch_size` events with a sequence greater than
    /// `cursor`, ordered by sequence, across all aggregates.
    ///
    /// Sequences are handed out at insert, not at commit. With concurrent
    /// writers a transaction holding a lower sequence can commit after a
    /// reader has already moved its cursor past a higher one, and that event
    /// is never returned to that cursor. Consumers that must see every event
    /// need to be idempotent and periodically rebuild from
    /// `Sequence::start()`, or read the affected streams with [`load`].
    ///
    /// [`load`]: EventStore::load
    async fn stream_since(&self, cursor: Sequence, batch_size: usize)
    -> Result<Vec<EventEnvelope>>;

    /// Saves a snapshot of an aggregate's state.
    ///
    /// An existing snapshot is only replaced by one with a strictly higher
    /// version. Returns whether this snapshot was stored.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<bool>;

    /// Retrieves the snapshot for an aggregate, if any.
    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event.
    async fn append_one(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        event: NewEvent,
    ) -> Result<Version> {
        self.append(aggregate_id, aggregate_type, expected_version, vec![event])
            .await
    }

    /// Loads every event of an aggregate.
    async fn load_all(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.load(aggregate_id, Version::first(), None).await
    }

    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(!self.current_version(aggregate_id).await?.is_initial())
    }

    /// Loads an aggregate's events, optionally starting from a snapshot.
    ///
    /// If a snapshot exists, returns the snapshot and events after it.
    /// Otherwise, returns None and all events.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.load_snapshot(aggregate_id).await? {
            let events = self
                .load(aggregate_id, snapshot.version.next(), None)
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.load_all(aggregate_id).await?;
            Ok((None, events))
        }
    }

    /// Streams every event after `cursor`, fetching `batch_size` at a time.
    ///
    /// The stream ends once it has caught up with the log. To resume, call
    /// again with the sequence of the last event received.
    fn stream_from(&self, cursor: Sequence, batch_size: usize) -> EventStream
    where
        Self: Clone + Sized + 'static,
    {
        let batch_size = batch_size.max(1);
        let initial = Some((self.clone(), cursor, VecDeque::new()));

        Box::pin(stream::unfold(initial, move |state| async move {
            let (store, cursor, mut buffer) = state?;
            if buffer.is_empty() {
                match store.stream_since(cursor, batch_size).await {
                    Ok(batch) => buffer.extend(batch),
                    Err(err) => return Some((Err(err), None)),
                }
            }
            let event: EventEnvelope = buffer.pop_front()?;
            let cursor = event.sequence;
            Some((Ok(event), Some((store, cursor, buffer))))
        }))
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Rejects malformed appends before any storage is touched.
pub fn validate_append(expected_version: Version, events: &[NewEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    }
    if expected_version.as_i64() < 0 {
        return Err(EventStoreError::InvalidAppend(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    if let Some(event) = events.iter().find(|e| e.event_type.is_empty()) {
        return Err(EventStoreError::InvalidAppend(format!(
            "event type must not be empty (payload {})",
            event.payload
        )));
    }
    Ok(())
}

/// Returns the inclusive upper bound for `load`, treating 0 as unbounded.
pub(crate) fn upper_bound(to: Option<Version>) -> Option<Version> {
    to.filter(|v| !v.is_initial())
}

/// Records append outcome metrics shared by every backend.
pub(crate) fn record_append(result: &Result<Version>, event_count: usize) {
    match result {
        Ok(_) => metrics::counter!("event_store_appends_total").increment(event_count as u64),
        Err(err) if err.is_concurrency_conflict() => {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1)
        }
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_append_is_rejected() {
        let result = validate_append(Version::initial(), &[]);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn negative_expected_version_is_rejected() {
        let events = vec![NewEvent::new("ItemAdded", serde_json::json!({}))];
        let result = validate_append(Version::new(-1), &events);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn blank_event_type_is_rejected() {
        let events = vec![NewEvent::new("", serde_json::json!({}))];
        assert!(validate_append(Version::initial(), &events).is_err());
    }

    #[test]
    fn well_formed_append_passes() {
        let events = vec![
            NewEvent::new("ItemAdded", serde_json::json!({})),
            NewEvent::new("ItemCopiesUpdated", serde_json::json!({})),
        ];
        assert!(validate_append(Version::new(3), &events).is_ok());
    }

    #[test]
    fn zero_upper_bound_means_unbounded() {
        assert_eq!(upper_bound(None), None);
        assert_eq!(upper_bound(Some(Version::initial())), None);
        assert_eq!(upper_bound(Some(Version::new(4))), Some(Version::new(4)));
    }
}
