//! Item rows from catalog events.

use async_trait::async_trait;
use domain::{Aggregate, Item, ItemEvent};
use event_store::EventEnvelope;

use crate::projection::Projection;
use crate::read_model::{ItemRow, ItemRowStore};
use crate::{ProjectionError, Result};

/// Maintains one [`ItemRow`] per catalog item.
#[derive(Clone)]
pub struct ItemProjector<R> {
    rows: R,
}

impl<R: ItemRowStore> ItemProjector<R> {
    pub fn new(rows: R) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }
}

#[async_trait]
impl<R: ItemRowStore> Projection for ItemProjector<R> {
    fn name(&self) -> &'static str {
        "items"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Item::aggregate_type() {
            return Ok(());
        }

        let existing = self.rows.get_item_row(event.aggregate_id).await?;
        if existing
            .as_ref()
            .is_some_and(|row| row.version >= event.version)
        {
            return Ok(());
        }

        let mut row = match (event.decode::<ItemEvent>()?, existing) {
            (ItemEvent::ItemAdded(data), _) => ItemRow {
                item_id: data.item_id,
                isbn: data.isbn,
                title: data.title,
                author: data.author,
                total_copies: data.total_copies,
                available: data.total_copies,
                retired: false,
                version: event.version,
                updated_at: event.timestamp,
            },
            (ItemEvent::ItemCopiesUpdated(data), Some(mut row)) => {
                row.total_copies = data.new_total;
                row.available = data.new_available;
                row
            }
            (ItemEvent::ItemRetired(_), Some(mut row)) => {
                row.retired = true;
                row
            }
            (_, None) => {
                return Err(ProjectionError::MissingRow {
                    aggregate_type: Item::aggregate_type(),
                    aggregate_id: event.aggregate_id.to_string(),
                });
            }
        };
        row.version = event.version;
        row.updated_at = event.timestamp;

        self.rows.upsert_item_row(&row).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.rows.clear_item_rows().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use common::AggregateId;
    use domain::DomainEvent;
    use event_store::{Sequence, Version};

    use super::*;
    use crate::InMemoryReadModels;

    fn envelope(item_id: AggregateId, version: i64, event: &ItemEvent) -> EventEnvelope {
        EventEnvelope {
            sequence: Sequence::new(version),
            aggregate_id: item_id,
            aggregate_type: "Item".into(),
            event_type: event.event_type().into(),
            version: Version::new(version),
            timestamp: Utc::now(),
            payload: serde_json::to_value(event).unwrap(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn builds_row_from_added_and_updated() {
        let models = InMemoryReadModels::new();
        let projector = ItemProjector::new(models.clone());
        let item_id = AggregateId::new();

        let added = ItemEvent::item_added(item_id, "978-0", "Dune", "Herbert", 3);
        projector.handle(&envelope(item_id, 1, &added)).await.unwrap();
        projector
            .handle(&envelope(item_id, 2, &ItemEvent::copies_updated(3, 1)))
            .await
            .unwrap();

        let row = models.get_item_row(item_id).await.unwrap().unwrap();
        assert_eq!(row.title, "Dune");
        assert_eq!(row.total_copies, 3);
        assert_eq!(row.available, 1);
        assert_eq!(row.version, Version::new(2));
    }

    #[tokio::test]
    async fn replayed_event_is_ignored() {
        let models = InMemoryReadModels::new();
        let projector = ItemProjector::new(models.clone());
        let item_id = AggregateId::new();

        let added = ItemEvent::item_added(item_id, "978-0", "Dune", "Herbert", 3);
        let update = envelope(item_id, 2, &ItemEvent::copies_updated(3, 2));
        projector.handle(&envelope(item_id, 1, &added)).await.unwrap();
        projector.handle(&update).await.unwrap();
        projector.handle(&update).await.unwrap();
        // Replaying the creation must not reset the counts either.
        projector.handle(&envelope(item_id, 1, &added)).await.unwrap();

        let row = models.get_item_row(item_id).await.unwrap().unwrap();
        assert_eq!(row.available, 2);
        assert_eq!(row.version, Version::new(2));
    }

    #[tokio::test]
    async fn update_without_row_is_an_error() {
        let projector = ItemProjector::new(InMemoryReadModels::new());
        let item_id = AggregateId::new();

        let result = projector
            .handle(&envelope(item_id, 2, &ItemEvent::copies_updated(3, 2)))
            .await;
        assert!(matches!(result, Err(ProjectionError::MissingRow { .. })));
    }

    #[tokio::test]
    async fn ignores_other_aggregate_types() {
        let models = InMemoryReadModels::new();
        let projector = ItemProjector::new(models.clone());

        let mut event = envelope(AggregateId::new(), 1, &ItemEvent::item_retired());
        event.aggregate_type = "Checkout".into();
        projector.handle(&event).await.unwrap();

        assert_eq!(models.item_count().await, 0);
    }

    #[tokio::test]
    async fn retired_flag_is_projected() {
        let models = InMemoryReadModels::new();
        let projector = ItemProjector::new(models.clone());
        let item_id = AggregateId::new();

        let added = ItemEvent::item_added(item_id, "978-0", "Dune", "Herbert", 1);
        projector.handle(&envelope(item_id, 1, &added)).await.unwrap();
        projector
            .handle(&envelope(item_id, 2, &ItemEvent::item_retired()))
            .await
            .unwrap();

        assert!(models.get_item_row(item_id).await.unwrap().unwrap().retired);
    }
}
