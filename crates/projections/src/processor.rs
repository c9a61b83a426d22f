//! Projection processor for feeding events to projections.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use event_store::{EventEnvelope, EventStore, Sequence};

use crate::Result;
use crate::projection::Projection;
use crate::read_model::CheckpointStore;

/// Default number of events fetched per `stream_since` call.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Processes events from an event store and delivers them to projections.
///
/// Each projection has its own checkpoint: the global sequence of the last
/// event it finished. The processor supports:
/// - Catch-up: pages through `stream_since` from each checkpoint
/// - Single event delivery: hands a fresh event to every projection
/// - Rebuild: resets all projections and replays from the start
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    checkpoints: Arc<dyn CheckpointStore>,
    projections: Vec<Box<dyn Projection>>,
    batch_size: usize,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor reading from `store` and tracking progress
    /// in `checkpoints`.
    pub fn new(store: S, checkpoints: impl CheckpointStore + 'static) -> Self {
        Self {
            store,
            checkpoints: Arc::new(checkpoints),
            projections: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many events are fetched per page.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Returns the checkpoint of the named projection.
    pub async fn checkpoint(&self, projection: &str) -> Result<Sequence> {
        self.checkpoints.load_checkpoint(projection).await
    }

    /// Brings every projection up to the end of the log. Returns the number
    /// of deliveries made.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut delivered = 0;
        for projection in &self.projections {
            delivered += self.catch_up(projection.as_ref()).await?;
        }

        if delivered > 0 {
            tracing::info!(events_processed = delivered, "catch-up complete");
        }
        Ok(delivered)
    }

    async fn catch_up(&self, projection: &dyn Projection) -> Result<u64> {
        let name = projection.name();
        let mut cursor = self.checkpoints.load_checkpoint(name).await?;
        let mut delivered = 0;

        loop {
            let batch = self.store.stream_since(cursor, self.batch_size).await?;
            let Some(last) = batch.last().map(|e| e.sequence) else {
                break;
            };

            for event in &batch {
                projection.handle(event).await?;
                metrics::counter!("projections_events_processed", "projection" => name)
                    .increment(1);
            }
            delivered += batch.len() as u64;

            cursor = last;
            self.checkpoints.save_checkpoint(name, cursor).await?;
            tracing::debug!(projection = name, %cursor, "checkpoint saved");

            if batch.len() < self.batch_size {
                break;
            }
        }

        Ok(delivered)
    }

    /// Delivers a single event to every projection whose checkpoint is
    /// behind it.
    ///
    /// Checkpoints are left alone: events between the checkpoint and this
    /// one have not been seen yet, and the next catch-up re-delivers this
    /// event as a no-op.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, sequence = %event.sequence))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            let checkpoint = self.checkpoints.load_checkpoint(projection.name()).await?;
            if event.sequence > checkpoint {
                projection.handle(event).await?;
            }
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
            self.checkpoints
                .save_checkpoint(projection.name(), Sequence::start())
                .await?;
        }
        self.run_catch_up().await
    }

    /// Polls the log every `poll_interval` until `shutdown` resolves.
    ///
    /// Failed catch-ups are logged and retried on the next tick.
    pub async fn run(&self, poll_interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("projection processor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.run_catch_up().await {
                        tracing::warn!(%error, "projection catch-up failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryReadModels;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{EventStoreExt, InMemoryEventStore, NewEvent, Version};
    use tokio::sync::RwLock;

    /// A simple counting projection for testing.
    #[derive(Clone)]
    struct CountingProjection {
        name: &'static str,
        count: Arc<RwLock<u64>>,
    }

    impl CountingProjection {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                count: Arc::new(RwLock::new(0)),
            }
        }

        async fn count(&self) -> u64 {
            *self.count.read().await
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            Ok(())
        }
    }

    async fn store_with_events(n: usize) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let events = (0..n)
            .map(|i| NewEvent::new("TestEvent", serde_json::json!({ "n": i })))
            .collect();
        store
            .append(AggregateId::new(), "Test", Version::initial(), events)
            .await
            .unwrap();
        store
    }

    fn processor_with(
        store: InMemoryEventStore,
        projections: &[&CountingProjection],
    ) -> ProjectionProcessor<InMemoryEventStore> {
        let mut processor =
            ProjectionProcessor::new(store, InMemoryReadModels::new()).with_batch_size(2);
        for projection in projections {
            processor.register(Box::new((*projection).clone()));
        }
        processor
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events_in_batches() {
        let store = store_with_events(5).await;
        let projection = CountingProjection::new("counting");
        let processor = processor_with(store, &[&projection]);

        assert_eq!(processor.run_catch_up().await.unwrap(), 5);
        assert_eq!(projection.count().await, 5);
        assert_eq!(
            processor.checkpoint("counting").await.unwrap(),
            Sequence::new(5)
        );
    }

    #[tokio::test]
    async fn test_catch_up_resumes_from_checkpoint() {
        let store = store_with_events(3).await;
        let projection = CountingProjection::new("counting");
        let processor = processor_with(store.clone(), &[&projection]);

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);

        store
            .append_one(
                AggregateId::new(),
                "Test",
                Version::initial(),
                NewEvent::new("TestEvent", serde_json::json!({})),
            )
            .await
            .unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(projection.count().await, 4);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let store = store_with_events(2).await;
        let projection = CountingProjection::new("counting");
        let processor = processor_with(store, &[&projection]);

        processor.run_catch_up().await.unwrap();
        assert_eq!(projection.count().await, 2);

        processor.rebuild_all().await.unwrap();
        assert_eq!(projection.count().await, 2);
    }

    #[tokio::test]
    async fn test_process_event_skips_seen_events() {
        let store = store_with_events(2).await;
        let projection = CountingProjection::new("counting");
        let processor = processor_with(store.clone(), &[&projection]);
        processor.run_catch_up().await.unwrap();

        let seen = store.stream_since(Sequence::start(), 1).await.unwrap();
        processor.process_event(&seen[0]).await.unwrap();
        assert_eq!(projection.count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_store_catch_up() {
        let projection = CountingProjection::new("counting");
        let processor = processor_with(InMemoryEventStore::new(), &[&projection]);

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(
            processor.checkpoint("counting").await.unwrap(),
            Sequence::start()
        );
    }

    #[tokio::test]
    async fn test_projections_keep_separate_checkpoints() {
        let store = store_with_events(2).await;
        let checkpoints = InMemoryReadModels::new();
        let first = CountingProjection::new("first");

        let mut processor = ProjectionProcessor::new(store.clone(), checkpoints.clone());
        processor.register(Box::new(first.clone()));
        processor.run_catch_up().await.unwrap();

        // A projection registered later starts from the beginning.
        let second = CountingProjection::new("second");
        let mut processor = ProjectionProcessor::new(store, checkpoints);
        processor.register(Box::new(first.clone()));
        processor.register(Box::new(second.clone()));
        assert_eq!(processor.projection_count(), 2);
        processor.run_catch_up().await.unwrap();

        assert_eq!(first.count().await, 2);
        assert_eq!(second.count().await, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let projection = CountingProjection::new("counting");
        let processor = processor_with(store_with_events(1).await, &[&projection]);

        processor
            .run(Duration::from_millis(5), tokio::time::sleep(Duration::from_millis(30)))
            .await;
        assert_eq!(projection.count().await, 1);
    }
}
