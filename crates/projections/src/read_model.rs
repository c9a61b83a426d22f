//! Current-state rows and the stores that hold them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, MemberId};
use domain::{Aggregate, Checkout, CheckoutStatus, Item};
use event_store::{Sequence, Version};
use serde::{Deserialize, Serialize};

use crate::{ProjectionError, Result};

/// Current state of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    pub item_id: AggregateId,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub available: u32,
    pub retired: bool,
    /// Version of the last event applied to this row.
    pub version: Version,
    pub updated_at: DateTime<Utc>,
}

impl ItemRow {
    /// Builds the row for an item aggregate, or None if it was never added.
    pub fn from_aggregate(item: &Item, updated_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            item_id: item.id()?,
            isbn: item.isbn().to_string(),
            title: item.title().to_string(),
            author: item.author().to_string(),
            total_copies: item.total_copies(),
            available: item.available(),
            retired: item.is_retired(),
            version: item.version(),
            updated_at,
        })
    }

    /// Rejects rows with more copies available than exist.
    pub fn validate(&self) -> Result<()> {
        if self.available > self.total_copies {
            return Err(ProjectionError::InvalidRow(format!(
                "item {}: {} available of {} total",
                self.item_id, self.available, self.total_copies
            )));
        }
        Ok(())
    }
}

/// Current state of one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
    pub checkout_id: AggregateId,
    pub member_id: MemberId,
    pub item_id: AggregateId,
    pub status: CheckoutStatus,
    pub checkout_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    /// Version of the last event applied to this record.
    pub version: Version,
}

impl CheckoutRecord {
    /// Builds the record for a checkout aggregate, or None if nothing was
    /// checked out.
    pub fn from_aggregate(checkout: &Checkout) -> Option<Self> {
        Some(Self {
            checkout_id: checkout.id()?,
            member_id: checkout.member_id()?,
            item_id: checkout.item_id()?,
            status: checkout.status()?,
            checkout_date: checkout.checkout_date()?,
            due_date: checkout.due_date()?,
            return_date: checkout.return_date(),
            version: checkout.version(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == CheckoutStatus::Active
    }
}

/// Storage for item rows.
///
/// Upserts are conditional: a row is only written when its version is
/// strictly higher than the stored one. The return value says whether the
/// write happened.
#[async_trait]
pub trait ItemRowStore: Send + Sync {
    async fn get_item_row(&self, item_id: AggregateId) -> Result<Option<ItemRow>>;

    async fn upsert_item_row(&self, row: &ItemRow) -> Result<bool>;

    async fn clear_item_rows(&self) -> Result<()>;
}

/// Storage for checkout records.
#[async_trait]
pub trait CheckoutRecordStore: Send + Sync {
    async fn get_checkout_record(&self, checkout_id: AggregateId)
    -> Result<Option<CheckoutRecord>>;

    /// Finds the active checkout of `item_id` by `member_id`, if any.
    async fn find_active_checkout(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
    ) -> Result<Option<CheckoutRecord>>;

    /// Conditional upsert, same rules as [`ItemRowStore::upsert_item_row`].
    async fn upsert_checkout_record(&self, record: &CheckoutRecord) -> Result<bool>;

    async fn clear_checkout_records(&self) -> Result<()>;
}

/// Per-projection global cursor.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the last sequence the projection finished, or the start.
    async fn load_checkpoint(&self, projection: &str) -> Result<Sequence>;

    async fn save_checkpoint(&self, projection: &str, position: Sequence) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(total: u32, available: u32) -> ItemRow {
        ItemRow {
            item_id: AggregateId::new(),
            isbn: "978-0".into(),
            title: "Dune".into(),
            author: "Herbert".into(),
            total_copies: total,
            available,
            retired: false,
            version: Version::first(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn validate_accepts_rows_within_bounds() {
        assert!(row(2, 0).validate().is_ok());
        assert!(row(2, 2).validate().is_ok());
    }

    #[test]
    fn validate_rejects_available_above_total() {
        assert!(matches!(
            row(1, 2).validate(),
            Err(ProjectionError::InvalidRow(_))
        ));
    }
}
