//! Domain layer for the circulation system.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait for event-sourced entities
//! - DomainEvent trait for domain events
//! - Command trait and CommandHandler for command processing
//! - Catalog item and checkout aggregates with their services

pub mod aggregate;
pub mod catalog;
pub mod circulation;
pub mod command;
pub mod error;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use catalog::{
    AddItem, CHANGE_ID_KEY, CatalogService, Item, ItemAddedData, ItemCopiesUpdatedData, ItemError,
    ItemEvent, ItemRetiredData, RetireItem, SetCopies,
};
pub use circulation::{
    CheckOutItem, Checkout, CheckoutError, CheckoutEvent, CheckoutStatus, CheckoutVoidedData,
    CirculationService, ItemCheckedOutData, ItemReturnedData, ReturnCheckout, VoidCheckout,
};
pub use command::{Command, CommandHandler, CommandResult, ExecuteOptions};
pub use error::DomainError;

/// Metadata key under which the saga run id is recorded on events.
pub const SAGA_ID_KEY: &str = "saga_id";
