//! In-memory read models for testing and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, MemberId};
use event_store::Sequence;
use tokio::sync::RwLock;

use crate::Result;
use crate::read_model::{
    CheckoutRecord, CheckoutRecordStore, CheckpointStore, ItemRow, ItemRowStore,
};

#[derive(Default)]
struct Tables {
    items: HashMap<AggregateId, ItemRow>,
    checkouts: HashMap<AggregateId, CheckoutRecord>,
    checkpoints: HashMap<String, Sequence>,
}

/// In-memory item rows, checkout records and checkpoints.
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryReadModels {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryReadModels {
    /// Creates empty read models.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of item rows.
    pub async fn item_count(&self) -> usize {
        self.tables.read().await.items.len()
    }

    /// Number of checkout records.
    pub async fn checkout_count(&self) -> usize {
        self.tables.read().await.checkouts.len()
    }

    /// All checkout records of one item.
    pub async fn checkouts_for_item(&self, item_id: AggregateId) -> Vec<CheckoutRecord> {
        self.tables
            .read()
            .await
            .checkouts
            .values()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ItemRowStore for InMemoryReadModels {
    async fn get_item_row(&self, item_id: AggregateId) -> Result<Option<ItemRow>> {
        Ok(self.tables.read().await.items.get(&item_id).cloned())
    }

    async fn upsert_item_row(&self, row: &ItemRow) -> Result<bool> {
        row.validate()?;

        let mut tables = self.tables.write().await;
        match tables.items.get(&row.item_id) {
            Some(existing) if existing.version >= row.version => Ok(false),
            _ => {
                tables.items.insert(row.item_id, row.clone());
                Ok(true)
            }
        }
    }

    async fn clear_item_rows(&self) -> Result<()> {
        self.tables.write().await.items.clear();
        Ok(())
    }
}

#[async_trait]
impl CheckoutRecordStore for InMemoryReadModels {
    async fn get_checkout_record(
        &self,
        checkout_id: AggregateId,
    ) -> Result<Option<CheckoutRecord>> {
        Ok(self.tables.read().await.checkouts.get(&checkout_id).cloned())
    }

    async fn find_active_checkout(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
    ) -> Result<Option<CheckoutRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .checkouts
            .values()
            .filter(|r| r.member_id == member_id && r.item_id == item_id && r.is_active())
            .max_by_key(|r| r.checkout_date)
            .cloned())
    }

    async fn upsert_checkout_record(&self, record: &CheckoutRecord) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.checkouts.get(&record.checkout_id) {
            Some(existing) if existing.version >= record.version => Ok(false),
            _ => {
                tables.checkouts.insert(record.checkout_id, record.clone());
                Ok(true)
            }
        }
    }

    async fn clear_checkout_records(&self) -> Result<()> {
        self.tables.write().await.checkouts.clear();
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryReadModels {
    async fn load_checkpoint(&self, projection: &str) -> Result<Sequence> {
        Ok(self
            .tables
            .read()
            .await
            .checkpoints
            .get(projection)
            .copied()
            .unwrap_or_default())
    }

    async fn save_checkpoint(&self, projection: &str, position: Sequence) -> Result<()> {
        self.tables
            .write()
            .await
            .checkpoints
            .insert(projection.to_string(), position);
        Ok(())
    }
}
