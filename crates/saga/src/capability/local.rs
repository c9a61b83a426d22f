//! Inventory capability over the in-process catalog service.

use async_trait::async_trait;
use chrono::Utc;
use common::AggregateId;
use domain::{Aggregate, CHANGE_ID_KEY, CatalogService, ExecuteOptions, Item, SetCopies};
use event_store::{EventStore, Version};
use projections::{ItemRow, ItemRowStore};

use super::{InventoryCapability, ItemAvailability};
use crate::error::CapabilityError;

/// Inventory capability for deployments where the catalog lives in the same
/// event store.
///
/// Reads come from the item aggregate, never the row, so decisions are made
/// on the version the append will be checked against. After each committed
/// change the item row is refreshed; a failed refresh is logged and left to
/// the item projector.
pub struct LocalInventory<S: EventStore, R> {
    catalog: CatalogService<S>,
    rows: R,
}

impl<S: EventStore, R: ItemRowStore> LocalInventory<S, R> {
    pub fn new(store: S, rows: R) -> Self {
        Self {
            catalog: CatalogService::new(store),
            rows,
        }
    }

    pub fn catalog(&self) -> &CatalogService<S> {
        &self.catalog
    }

    async fn refresh_row(&self, item: &Item) {
        let Some(row) = ItemRow::from_aggregate(item, Utc::now()) else {
            return;
        };
        if let Err(error) = self.rows.upsert_item_row(&row).await {
            tracing::warn!(item_id = %row.item_id, %error, "item row refresh failed");
        }
    }
}

#[async_trait]
impl<S: EventStore, R: ItemRowStore> InventoryCapability for LocalInventory<S, R> {
    async fn get_item(&self, item_id: AggregateId) -> Result<ItemAvailability, CapabilityError> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| CapabilityError::NotFound {
                entity: "item",
                id: item_id.to_string(),
            })?;

        Ok(ItemAvailability {
            item_id,
            total_copies: item.total_copies(),
            available: item.available(),
            version: item.version(),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn set_copies(
        &self,
        item_id: AggregateId,
        total_copies: u32,
        available: u32,
        expected_version: Version,
        change_id: &str,
    ) -> Result<Version, CapabilityError> {
        let options = ExecuteOptions::new()
            .expect_version(expected_version)
            .with_metadata(CHANGE_ID_KEY, change_id);

        let result = self
            .catalog
            .set_copies(SetCopies::new(item_id, total_copies, available), options)
            .await?;

        self.refresh_row(&result.aggregate).await;
        Ok(result.new_version)
    }

    async fn change_applied(
        &self,
        item_id: AggregateId,
        change_id: &str,
    ) -> Result<bool, CapabilityError> {
        Ok(self.catalog.change_applied(item_id, change_id).await?)
    }
}
