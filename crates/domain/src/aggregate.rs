//! Aggregate and event traits shared by items and checkouts.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on one aggregate stream, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Name stored in the event row's `event_type` column.
    fn event_type(&self) -> &'static str;
}

/// State rebuilt by folding the events of one stream.
///
/// Commands live on the aggregate and return the events they would record;
/// [`apply`](Aggregate::apply) is the only place state changes.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Stored as the stream's `aggregate_type`; projectors filter on it.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    /// Set by the command handler from the store-assigned version.
    fn set_version(&mut self, version: Version);

    /// Folds one committed event into the state. Never fails: the event
    /// already happened.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state can be stored as a snapshot and loaded from it.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    /// Returns whether moving from `from` to `to` passed a snapshot boundary.
    ///
    /// A multi-event command can jump over the exact multiple, so the check
    /// compares interval buckets rather than testing `to` alone.
    fn crosses_snapshot_interval(from: Version, to: Version) -> bool {
        let interval = Self::snapshot_interval().max(1) as i64;
        to > from && from.as_i64() / interval != to.as_i64() / interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum ShelfEvent {
        Opened { shelf_id: AggregateId },
        Restocked { copies: u32 },
    }

    impl DomainEvent for ShelfEvent {
        fn event_type(&self) -> &'static str {
            match self {
                ShelfEvent::Opened { .. } => "ShelfOpened",
                ShelfEvent::Restocked { .. } => "ShelfRestocked",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Shelf {
        id: Option<AggregateId>,
        copies: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("shelf error")]
    struct ShelfError;

    impl Aggregate for Shelf {
        type Event = ShelfEvent;
        type Error = ShelfError;

        fn aggregate_type() -> &'static str {
            "Shelf"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                ShelfEvent::Opened { shelf_id } => self.id = Some(shelf_id),
                ShelfEvent::Restocked { copies } => self.copies += copies,
            }
        }
    }

    impl SnapshotCapable for Shelf {
        fn snapshot_interval() -> usize {
            10
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let shelf_id = AggregateId::new();
        let mut shelf = Shelf::default();
        assert!(shelf.id().is_none());

        shelf.apply_events([
            ShelfEvent::Opened { shelf_id },
            ShelfEvent::Restocked { copies: 2 },
            ShelfEvent::Restocked { copies: 3 },
        ]);

        assert_eq!(shelf.id(), Some(shelf_id));
        assert_eq!(shelf.copies, 5);
        assert_eq!(
            ShelfEvent::Restocked { copies: 1 }.event_type(),
            "ShelfRestocked"
        );
    }

    #[test]
    fn snapshot_boundary_is_crossed_by_multi_event_jumps() {
        let crosses = |from, to| Shelf::crosses_snapshot_interval(Version::new(from), Version::new(to));

        assert!(crosses(8, 11));
        assert!(crosses(9, 10));
        assert!(!crosses(10, 11));
        assert!(!crosses(5, 5));
        assert!(!crosses(12, 19));
    }
}
