use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AggregateId;

/// Version number for an aggregate, used for optimistic concurrency control.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on an aggregate. Version 0 means "no events yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version `n` events after this one.
    pub fn advance(&self, n: usize) -> Self {
        Self(self.0 + n as i64)
    }

    /// Returns true for the "no events yet" version.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Store-assigned global position of an event, increasing across all
/// aggregates. Used as the cursor for `stream_since`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Cursor positioned before the first event.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A committed event as read back from the store.
///
/// Everything except `event_type`, `payload` and `metadata` is assigned by
/// the store at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Global position across all aggregates.
    pub sequence: Sequence,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The kind of aggregate (e.g., "Item", "Checkout").
    pub aggregate_type: String,

    /// The kind of fact (e.g., "ItemCheckedOut").
    pub event_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// When the event was committed.
    pub timestamp: DateTime<Utc>,

    /// The event payload; its schema belongs to the caller.
    pub payload: serde_json::Value,

    /// Additional metadata about the event (correlation ids and the like).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Deserializes the payload into a concrete event type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Looks up a string metadata entry.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// An event waiting to be appended.
///
/// Callers only describe the fact; the store decides its version and
/// sequence inside the append transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewEvent {
    /// Creates an event from a raw JSON payload.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Creates an event by serializing `payload`.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merges a whole metadata map, later keys winning.
    pub fn with_metadata_map(mut self, metadata: &HashMap<String, serde_json::Value>) -> Self {
        self.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}
