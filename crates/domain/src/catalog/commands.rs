//! Catalog item commands.

use common::AggregateId;

use crate::command::Command;

use super::Item;

/// Command to add a new item to the catalog.
#[derive(Debug, Clone)]
pub struct AddItem {
    pub item_id: AggregateId,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
}

impl AddItem {
    /// Creates a new AddItem command with a generated item ID.
    pub fn new(
        isbn: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        total_copies: u32,
    ) -> Self {
        Self {
            item_id: AggregateId::new(),
            isbn: isbn.into(),
            title: title.into(),
            author: author.into(),
            total_copies,
        }
    }
}

impl Command for AddItem {
    type Aggregate = Item;

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to set absolute copy counts on an item.
#[derive(Debug, Clone)]
pub struct SetCopies {
    pub item_id: AggregateId,
    pub total_copies: u32,
    pub available: u32,
}

impl SetCopies {
    pub fn new(item_id: AggregateId, total_copies: u32, available: u32) -> Self {
        Self {
            item_id,
            total_copies,
            available,
        }
    }
}

impl Command for SetCopies {
    type Aggregate = Item;

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to retire an item from circulation.
#[derive(Debug, Clone)]
pub struct RetireItem {
    pub item_id: AggregateId,
}

impl RetireItem {
    pub fn new(item_id: AggregateId) -> Self {
        Self { item_id }
    }
}

impl Command for RetireItem {
    type Aggregate = Item;

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}
