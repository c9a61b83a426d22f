//! Catalog service providing a simplified API for item operations.

use common::AggregateId;
use event_store::{EventStore, EventStoreExt};

use crate::command::{Command, CommandHandler, CommandResult, ExecuteOptions};
use crate::error::DomainError;

use super::{AddItem, Item, RetireItem, SetCopies};

/// Metadata key under which a caller-chosen change id is recorded.
pub const CHANGE_ID_KEY: &str = "change_id";

/// Service for managing catalog items.
///
/// Every write goes through the snapshotting command handler, so item
/// streams stay cheap to load no matter how many loans they have seen.
pub struct CatalogService<S: EventStore> {
    handler: CommandHandler<S, Item>,
}

impl<S: EventStore> CatalogService<S> {
    /// Creates a new catalog service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Item> {
        &self.handler
    }

    /// Adds a new item to the catalog.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, cmd: AddItem) -> Result<CommandResult<Item>, DomainError> {
        self.handler
            .execute_with_snapshot(cmd.aggregate_id(), ExecuteOptions::new(), |item| {
                item.add(
                    cmd.item_id,
                    &cmd.isbn,
                    &cmd.title,
                    &cmd.author,
                    cmd.total_copies,
                )
            })
            .await
    }

    /// Sets absolute copy counts.
    ///
    /// `options.expected_version` turns this into a compare-and-set against
    /// the version the caller read; a change id in `options.metadata` is
    /// recorded on the event so [`CatalogService::change_applied`] can find
    /// it later.
    #[tracing::instrument(skip(self))]
    pub async fn set_copies(
        &self,
        cmd: SetCopies,
        options: ExecuteOptions,
    ) -> Result<CommandResult<Item>, DomainError> {
        self.handler
            .execute_with_snapshot(cmd.aggregate_id(), options, |item| {
                item.set_copies(cmd.total_copies, cmd.available)
            })
            .await
    }

    /// Retires an item.
    #[tracing::instrument(skip(self))]
    pub async fn retire_item(&self, cmd: RetireItem) -> Result<CommandResult<Item>, DomainError> {
        self.handler
            .execute_with_snapshot(cmd.aggregate_id(), ExecuteOptions::new(), |item| {
                item.retire()
            })
            .await
    }

    /// Loads an item by ID.
    ///
    /// Returns None if the item doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, item_id: AggregateId) -> Result<Option<Item>, DomainError> {
        self.handler.load_existing(item_id).await
    }

    /// Returns true if an event tagged with `change_id` was committed on the
    /// item's stream.
    #[tracing::instrument(skip(self))]
    pub async fn change_applied(
        &self,
        item_id: AggregateId,
        change_id: &str,
    ) -> Result<bool, DomainError> {
        let events = self.handler.store().load_all(item_id).await?;
        Ok(events
            .iter()
            .any(|e| e.metadata_str(CHANGE_ID_KEY) == Some(change_id)))
    }
}

impl<S: EventStore> CatalogService<S> {
    /// Convenience: adds an item and returns its ID.
    pub async fn add(
        &self,
        isbn: &str,
        title: &str,
        author: &str,
        total_copies: u32,
    ) -> Result<AggregateId, DomainError> {
        let cmd = AddItem::new(isbn, title, author, total_copies);
        let item_id = cmd.item_id;
        self.add_item(cmd).await?;
        Ok(item_id)
    }
}
