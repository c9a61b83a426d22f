//! Command handling infrastructure.

use std::collections::HashMap;
use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventStore, EventStoreError, EventStoreExt, NewEvent, Snapshot, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Per-call options for [`CommandHandler::execute_with`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Version the caller based its decision on. When set, the command is
    /// rejected with a concurrency conflict if the aggregate has moved on.
    pub expected_version: Option<Version>,

    /// Metadata attached to every event the command produces.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecuteOptions {
    /// Creates options with no version expectation and no metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the aggregate to be at `version` when the command runs.
    pub fn expect_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Attaches a metadata entry to the produced events.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate from the event store (snapshot plus newer events)
/// 2. Executing the command to produce events
/// 3. Appending the events at the version it loaded
/// 4. Optionally saving a snapshot
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => self.restore_from_snapshot(snapshot)?,
            None => A::default(),
        };

        // Apply events after snapshot
        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_with(aggregate_id, ExecuteOptions::default(), command_fn)
            .await
    }

    /// Executes a command with an optional version expectation and event
    /// metadata.
    pub async fn execute_with<F>(
        &self,
        aggregate_id: AggregateId,
        options: ExecuteOptions,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        if let Some(expected) = options.expected_version
            && expected != current_version
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: Some(current_version),
            }
            .into());
        }

        // Execute command to get events
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let new_events = self.build_events(&events, &options.metadata)?;

        // The store rejects the append if anyone committed since `load`.
        let new_version = self
            .store
            .append(
                aggregate_id,
                A::aggregate_type(),
                current_version,
                new_events,
            )
            .await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Serializes domain events for appending.
    fn build_events(
        &self,
        events: &[A::Event],
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<NewEvent>, DomainError> {
        events
            .iter()
            .map(|event| {
                Ok(NewEvent::from_payload(event.event_type(), event)?.with_metadata_map(metadata))
            })
            .collect()
    }

    fn restore_from_snapshot(&self, snapshot: Snapshot) -> Result<A, DomainError> {
        let version = snapshot.version;
        let mut aggregate: A = snapshot.into_state()?;
        aggregate.set_version(version);
        Ok(aggregate)
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and saves a snapshot when the aggregate crosses a
    /// snapshot boundary.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        options: ExecuteOptions,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute_with(aggregate_id, options, command_fn).await?;
        let previous = Version::new(result.new_version.as_i64() - result.events.len() as i64);

        if A::crosses_snapshot_interval(previous, result.new_version) {
            let snapshot = Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                result.new_version,
                &result.aggregate,
            )?;
            // A lost snapshot race is harmless: a newer one already exists.
            if !self.store.save_snapshot(snapshot).await? {
                tracing::debug!(%aggregate_id, "newer snapshot already stored");
            }
        }

        Ok(result)
    }
}

impl<A: Aggregate> CommandResult<A> {
    /// Returns true if the command produced no events.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}
