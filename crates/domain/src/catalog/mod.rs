//! Catalog item aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::Item;
pub use commands::{AddItem, RetireItem, SetCopies};
pub use events::{ItemAddedData, ItemCopiesUpdatedData, ItemEvent, ItemRetiredData};
pub use service::{CHANGE_ID_KEY, CatalogService};

use thiserror::Error;

/// Errors that can occur during catalog item operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// The item has never been added.
    #[error("Item not found")]
    NotFound,

    /// The item was already added.
    #[error("Item already exists")]
    AlreadyExists,

    /// Title is required.
    #[error("Title is required")]
    TitleRequired,

    /// Copy counts would violate `available <= total`.
    #[error("Invalid copy counts: {available} available of {total} total")]
    InvalidCopies { total: u32, available: u32 },

    /// Every copy is on loan.
    #[error("No copies available")]
    NoCopiesAvailable,

    /// Copies are still on loan.
    #[error("{on_loan} copies are still on loan")]
    CopiesOnLoan { on_loan: u32 },

    /// The item was retired.
    #[error("Item is retired")]
    Retired,
}
