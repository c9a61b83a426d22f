use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, NewEvent, Result, Sequence, Snapshot, Version,
    store::{EventStore, record_append, upper_bound, validate_append},
};

#[derive(Default)]
struct Log {
    events: Vec<EventEnvelope>,
    last_sequence: i64,
}

impl Log {
    fn current_version(&self, aggregate_id: AggregateId) -> Version {
        self.events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store implementation for tests and single-process runs.
///
/// The whole log sits behind one write lock, so the version check and the
/// insert happen atomically just like the serializable transaction of the
/// PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
    failing_types: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.last_sequence = 0;
        self.snapshots.write().await.clear();
    }

    /// Makes every append for `aggregate_type` fail with `Unavailable`
    /// until `heal` is called.
    pub async fn fail_appends_for(&self, aggregate_type: impl Into<String>) {
        self.failing_types.write().await.insert(aggregate_type.into());
    }

    /// Removes every injected fault.
    pub async fn heal(&self) {
        self.failing_types.write().await.clear();
    }

    async fn try_append(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        events: Vec<NewEvent>,
    ) -> Result<Version> {
        validate_append(expected_version, &events)?;

        if self.failing_types.read().await.contains(aggregate_type) {
            return Err(EventStoreError::Unavailable(format!(
                "appends for {aggregate_type} are failing"
            )));
        }

        let mut log = self.log.write().await;

        let current = log.current_version(aggregate_id);
        if current != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: Some(current),
            });
        }

        let timestamp = Utc::now();
        let mut version = current;
        for event in events {
            version = version.next();
            log.last_sequence += 1;
            let sequence = Sequence::new(log.last_sequence);
            log.events.push(EventEnvelope {
                sequence,
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                event_type: event.event_type,
                version,
                timestamp,
                payload: event.payload,
                metadata: event.metadata,
            });
        }

        Ok(version)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: Version,
        events: Vec<NewEvent>,
    ) -> Result<Version> {
        let count = events.len();
        let result = self
            .try_append(aggregate_id, aggregate_type, expected_version, events)
            .await;
        record_append(&result, count);
        result
    }

    async fn load(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Option<Version>,
    ) -> Result<Vec<EventEnvelope>> {
        let to = upper_bound(to);
        let log = self.log.read().await;
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from)
            .filter(|e| to.is_none_or(|to| e.version <= to))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        Ok(self.log.read().await.current_version(aggregate_id))
    }

    async fn stream_since(
        &self,
        cursor: Sequence,
        batch_size: usize,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        // The log is appended in sequence order.
        Ok(log
            .events
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(batch_size)
            .cloned()
            .collect())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<bool> {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get(&snapshot.aggregate_id) {
            Some(current) if !snapshot.supersedes(current) => Ok(false),
            _ => {
                snapshots.insert(snapshot.aggregate_id, snapshot);
                Ok(true)
            }
        }
    }

    async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&aggregate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use futures_util::StreamExt;

    use super::*;
    use crate::EventStoreExt;

    fn new_event(event_type: &str) -> NewEvent {
        NewEvent::new(event_type, serde_json::json!({"test": true}))
    }

    fn events(count: usize) -> Vec<NewEvent> {
        (1..=count).map(|i| new_event(&format!("Event{i}"))).collect()
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let version = store
            .append(aggregate_id, "Item", Version::initial(), vec![new_event("ItemAdded")])
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let stored = store.load_all(aggregate_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].aggregate_type, "Item");
        assert_eq!(stored[0].sequence, Sequence::new(1));
    }

    #[tokio::test]
    async fn append_assigns_consecutive_versions() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let version = store
            .append(aggregate_id, "Item", Version::initial(), events(3))
            .await
            .unwrap();
        assert_eq!(version, Version::new(3));

        let version = store
            .append(aggregate_id, "Item", version, events(2))
            .await
            .unwrap();
        assert_eq!(version, Version::new(5));

        let versions: Vec<i64> = store
            .load_all(aggregate_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.version.as_i64())
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(aggregate_id, "Item", Version::initial(), events(1))
            .await
            .unwrap();

        let result = store
            .append(aggregate_id, "Item", Version::initial(), events(1))
            .await;

        match result {
            Err(EventStoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::initial());
                assert_eq!(actual, Some(Version::first()));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_append_touches_nothing() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let result = store
            .append(aggregate_id, "Item", Version::initial(), vec![])
            .await;
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_appends_have_exactly_one_winner() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(aggregate_id, "Item", Version::initial(), events(1))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(aggregate_id, "Item", Version::first(), events(1))
                    .await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(version) => {
                    assert_eq!(version, Version::new(2));
                    winners += 1;
                }
                Err(err) if err.is_concurrency_conflict() => conflicts += 1,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn retrying_appenders_produce_gapless_versions() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    loop {
                        let current = store.current_version(aggregate_id).await.unwrap();
                        match store.append(aggregate_id, "Item", current, events(1)).await {
                            Ok(_) => break,
                            Err(err) if err.is_concurrency_conflict() => tokio::task::yield_now().await,
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let versions: BTreeSet<i64> = store
            .load_all(aggregate_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.version.as_i64())
            .collect();
        assert_eq!(versions, (1..=40).collect());
    }

    #[tokio::test]
    async fn load_from_version_two_unbounded() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(aggregate_id, "Item", Version::initial(), events(5))
            .await
            .unwrap();

        for to in [None, Some(Version::initial())] {
            let loaded = store.load(aggregate_id, Version::new(2), to).await.unwrap();
            let versions: Vec<i64> = loaded.iter().map(|e| e.version.as_i64()).collect();
            assert_eq!(versions, vec![2, 3, 4, 5]);
        }

        let bounded = store
            .load(aggregate_id, Version::new(2), Some(Version::new(3)))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 2);
    }

    #[tokio::test]
    async fn current_version_of_unknown_aggregate_is_initial() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        assert_eq!(
            store.current_version(aggregate_id).await.unwrap(),
            Version::initial()
        );
        assert!(!store.aggregate_exists(aggregate_id).await.unwrap());

        store
            .append(aggregate_id, "Item", Version::initial(), events(2))
            .await
            .unwrap();
        assert_eq!(
            store.current_version(aggregate_id).await.unwrap(),
            Version::new(2)
        );
        assert!(store.aggregate_exists(aggregate_id).await.unwrap());
    }

    #[tokio::test]
    async fn stream_since_pages_by_sequence_across_aggregates() {
        let store = InMemoryEventStore::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        store
            .append(first, "Item", Version::initial(), events(2))
            .await
            .unwrap();
        store
            .append(second, "Checkout", Version::initial(), events(1))
            .await
            .unwrap();
        store
            .append(first, "Item", Version::new(2), events(1))
            .await
            .unwrap();

        let page = store.stream_since(Sequence::start(), 3).await.unwrap();
        let sequences: Vec<i64> = page.iter().map(|e| e.sequence.as_i64()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(page[2].aggregate_id, second);

        let rest = store.stream_since(Sequence::new(3), 3).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].version, Version::new(3));

        assert!(
            store
                .stream_since(Sequence::new(4), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stream_from_walks_the_whole_log_in_small_batches() {
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            store
                .append(AggregateId::new(), "Item", Version::initial(), events(3))
                .await
                .unwrap();
        }

        let streamed: Vec<_> = store.stream_from(Sequence::start(), 2).collect().await;
        let sequences: Vec<i64> = streamed
            .into_iter()
            .map(|e| e.unwrap().sequence.as_i64())
            .collect();
        assert_eq!(sequences, (1..=9).collect::<Vec<_>>());

        let resumed: Vec<_> = store.stream_from(Sequence::new(7), 2).collect().await;
        assert_eq!(resumed.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_save_and_retrieve() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let snapshot = Snapshot::new(
            aggregate_id,
            "Item",
            Version::new(5),
            serde_json::json!({"state": "saved"}),
        );
        assert!(store.save_snapshot(snapshot).await.unwrap());

        let retrieved = store.load_snapshot(aggregate_id).await.unwrap().unwrap();
        assert_eq!(retrieved.aggregate_id, aggregate_id);
        assert_eq!(retrieved.version, Version::new(5));
    }

    #[tokio::test]
    async fn snapshot_highest_version_wins_in_either_order() {
        let low = Version::new(3);
        let high = Version::new(8);

        for order in [[low, high], [high, low]] {
            let store = InMemoryEventStore::new();
            let aggregate_id = AggregateId::new();
            for version in order {
                store
                    .save_snapshot(Snapshot::new(
                        aggregate_id,
                        "Item",
                        version,
                        serde_json::json!({"at": version}),
                    ))
                    .await
                    .unwrap();
            }
            let kept = store.load_snapshot(aggregate_id).await.unwrap().unwrap();
            assert_eq!(kept.version, high);
        }
    }

    #[tokio::test]
    async fn snapshot_not_found() {
        let store = InMemoryEventStore::new();
        let result = store.load_snapshot(AggregateId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn load_aggregate_starts_after_snapshot() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(aggregate_id, "Item", Version::initial(), events(4))
            .await
            .unwrap();
        store
            .save_snapshot(Snapshot::new(
                aggregate_id,
                "Item",
                Version::new(3),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let (snapshot, rest) = store.load_aggregate(aggregate_id).await.unwrap();
        assert_eq!(snapshot.unwrap().version, Version::new(3));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].version, Version::new(4));
    }

    #[tokio::test]
    async fn injected_fault_fails_only_the_named_type() {
        let store = InMemoryEventStore::new();
        store.fail_appends_for("Checkout").await;

        let result = store
            .append(AggregateId::new(), "Checkout", Version::initial(), events(1))
            .await;
        assert!(matches!(result, Err(EventStoreError::Unavailable(_))));

        store
            .append(AggregateId::new(), "Item", Version::initial(), events(1))
            .await
            .unwrap();

        store.heal().await;
        store
            .append(AggregateId::new(), "Checkout", Version::initial(), events(1))
            .await
            .unwrap();
        assert_eq!(store.event_count().await, 2);
    }
}
