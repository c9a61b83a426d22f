//! Catalog item aggregate implementation.

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    ItemError, ItemEvent,
    events::{ItemAddedData, ItemCopiesUpdatedData},
};

/// Catalog item aggregate root.
///
/// Owns the copy counts of one title. Every state reachable through
/// commands keeps `available <= total_copies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    isbn: String,
    title: String,
    author: String,
    total_copies: u32,
    available: u32,
    retired: bool,
}

impl Aggregate for Item {
    type Event = ItemEvent;
    type Error = ItemError;

    fn aggregate_type() -> &'static str {
        "Item"
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
            ItemEvent::ItemAdded(data) => self.apply_item_added(data),
            ItemEvent::ItemCopiesUpdated(ItemCopiesUpdatedData {
                new_total,
                new_available,
            }) => {
                self.total_copies = new_total;
                self.available = new_available;
            }
            ItemEvent::ItemRetired(_) => {
                self.retired = true;
            }
        }
    }
}

impl SnapshotCapable for Item {
    fn snapshot_interval() -> usize {
        20
    }
}

// Query methods
impl Item {
    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    /// Copies currently out on loan.
    pub fn on_loan(&self) -> u32 {
        self.total_copies - self.available
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

// Command methods (return events)
impl Item {
    /// Adds the item to the catalog with every copy available.
    pub fn add(
        &self,
        item_id: AggregateId,
        isbn: &str,
        title: &str,
        author: &str,
        total_copies: u32,
    ) -> Result<Vec<ItemEvent>, ItemError> {
        if self.id.is_some() {
            return Err(ItemError::AlreadyExists);
        }
        if title.trim().is_empty() {
            return Err(ItemError::TitleRequired);
        }

        Ok(vec![ItemEvent::item_added(
            item_id,
            isbn,
            title,
            author,
            total_copies,
        )])
    }

    /// Sets absolute copy counts.
    ///
    /// Returns no events when the counts are unchanged.
    pub fn set_copies(&self, total: u32, available: u32) -> Result<Vec<ItemEvent>, ItemError> {
        self.ensure_active()?;

        if available > total {
            return Err(ItemError::InvalidCopies { total, available });
        }
        if total == self.total_copies && available == self.available {
            return Ok(vec![]);
        }

        Ok(vec![ItemEvent::copies_updated(total, available)])
    }

    /// Takes one copy off the shelf.
    pub fn check_out_copy(&self) -> Result<Vec<ItemEvent>, ItemError> {
        self.ensure_active()?;
        if self.available == 0 {
            return Err(ItemError::NoCopiesAvailable);
        }
        self.set_copies(self.total_copies, self.available - 1)
    }

    /// Puts one copy back on the shelf.
    pub fn return_copy(&self) -> Result<Vec<ItemEvent>, ItemError> {
        self.ensure_active()?;
        if self.available >= self.total_copies {
            return Err(ItemError::InvalidCopies {
                total: self.total_copies,
                available: self.available + 1,
            });
        }
        self.set_copies(self.total_copies, self.available + 1)
    }

    /// Retires the item. Only allowed once every copy is back.
    pub fn retire(&self) -> Result<Vec<ItemEvent>, ItemError> {
        self.ensure_active()?;
        if self.on_loan() > 0 {
            return Err(ItemError::CopiesOnLoan {
                on_loan: self.on_loan(),
            });
        }
        Ok(vec![ItemEvent::item_retired()])
    }

    fn ensure_active(&self) -> Result<(), ItemError> {
        if self.id.is_none() {
            return Err(ItemError::NotFound);
        }
        if self.retired {
            return Err(ItemError::Retired);
        }
        Ok(())
    }
}

// Event application
impl Item {
    fn apply_item_added(&mut self, data: ItemAddedData) {
        self.id = Some(data.item_id);
        self.isbn = data.isbn;
        self.title = data.title;
        self.author = data.author;
        self.total_copies = data.total_copies;
        self.available = data.total_copies;
        self.retired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with(total: u32, available: u32) -> Item {
        let mut item = Item::default();
        item.apply(ItemEvent::item_added(AggregateId::new(), "978-0", "Dune", "Herbert", total));
        item.apply(ItemEvent::copies_updated(total, available));
        item
    }

    #[test]
    fn test_add_item() {
        let item = Item::default();
        let id = AggregateId::new();
        let events = item.add(id, "978-0", "Dune", "Herbert", 3).unwrap();

        let mut item = Item::default();
        item.apply_events(events);
        assert_eq!(item.id(), Some(id));
        assert_eq!(item.total_copies(), 3);
        assert_eq!(item.available(), 3);
    }

    #[test]
    fn test_add_twice_is_rejected() {
        let item = item_with(1, 1);
        let result = item.add(AggregateId::new(), "978-0", "Dune", "Herbert", 1);
        assert!(matches!(result, Err(ItemError::AlreadyExists)));
    }

    #[test]
    fn test_add_requires_title() {
        let result = Item::default().add(AggregateId::new(), "978-0", "  ", "Herbert", 1);
        assert!(matches!(result, Err(ItemError::TitleRequired)));
    }

    #[test]
    fn test_set_copies_rejects_available_above_total() {
        let item = item_with(2, 2);
        let result = item.set_copies(2, 3);
        assert!(matches!(
            result,
            Err(ItemError::InvalidCopies {
                total: 2,
                available: 3
            })
        ));
    }

    #[test]
    fn test_set_copies_unchanged_is_noop() {
        let item = item_with(2, 1);
        assert!(item.set_copies(2, 1).unwrap().is_empty());
    }

    #[test]
    fn test_set_copies_on_unknown_item() {
        assert!(matches!(
            Item::default().set_copies(1, 1),
            Err(ItemError::NotFound)
        ));
    }

    #[test]
    fn test_check_out_and_return_copy() {
        let mut item = item_with(1, 1);

        let events = item.check_out_copy().unwrap();
        item.apply_events(events);
        assert_eq!(item.available(), 0);
        assert!(matches!(
            item.check_out_copy(),
            Err(ItemError::NoCopiesAvailable)
        ));

        let events = item.return_copy().unwrap();
        item.apply_events(events);
        assert_eq!(item.available(), 1);
        assert!(item.return_copy().is_err());
    }

    #[test]
    fn test_retire_requires_all_copies_back() {
        let item = item_with(2, 1);
        assert!(matches!(
            item.retire(),
            Err(ItemError::CopiesOnLoan { on_loan: 1 })
        ));

        let mut item = item_with(2, 2);
        item.apply_events(item.retire().unwrap());
        assert!(item.is_retired());
        assert!(matches!(item.set_copies(2, 1), Err(ItemError::Retired)));
    }
}
