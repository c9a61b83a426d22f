//! Catalog item domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a catalog item aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ItemEvent {
    /// Item was added to the catalog.
    ItemAdded(ItemAddedData),

    /// Total or available copy counts changed.
    ItemCopiesUpdated(ItemCopiesUpdatedData),

    /// Item was retired from circulation.
    ItemRetired(ItemRetiredData),
}

impl DomainEvent for ItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ItemEvent::ItemAdded(_) => "ItemAdded",
            ItemEvent::ItemCopiesUpdated(_) => "ItemCopiesUpdated",
            ItemEvent::ItemRetired(_) => "ItemRetired",
        }
    }
}

/// Data for ItemAdded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub item_id: AggregateId,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub added_at: DateTime<Utc>,
}

/// Data for ItemCopiesUpdated event.
///
/// Carries absolute counts, not deltas, so replay never depends on order
/// of application within a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCopiesUpdatedData {
    pub new_total: u32,
    pub new_available: u32,
}

/// Data for ItemRetired event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRetiredData {
    pub retired_at: DateTime<Utc>,
}

impl ItemEvent {
    /// Creates an ItemAdded event.
    pub fn item_added(
        item_id: AggregateId,
        isbn: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        total_copies: u32,
    ) -> Self {
        ItemEvent::ItemAdded(ItemAddedData {
            item_id,
            isbn: isbn.into(),
            title: title.into(),
            author: author.into(),
            total_copies,
            added_at: Utc::now(),
        })
    }

    /// Creates an ItemCopiesUpdated event.
    pub fn copies_updated(new_total: u32, new_available: u32) -> Self {
        ItemEvent::ItemCopiesUpdated(ItemCopiesUpdatedData {
            new_total,
            new_available,
        })
    }

    /// Creates an ItemRetired event.
    pub fn item_retired() -> Self {
        ItemEvent::ItemRetired(ItemRetiredData {
            retired_at: Utc::now(),
        })
    }
}
