//! Current-state read models for the circulation engine.
//!
//! This crate provides the query side the saga decides on:
//! - [`Projection`] trait for processing events into read models
//! - [`ItemRow`] and [`CheckoutRecord`] with their store traits, in memory
//!   and on PostgreSQL
//! - [`ItemProjector`] and [`CheckoutProjector`]
//! - [`ProjectionProcessor`] for feeding events from the store to projections

pub mod error;
pub mod memory;
pub mod postgres;
pub mod processor;
pub mod projection;
pub mod projectors;
pub mod read_model;

pub use error::{ProjectionError, Result};
pub use memory::InMemoryReadModels;
pub use postgres::PostgresReadModels;
pub use processor::{DEFAULT_BATCH_SIZE, ProjectionProcessor};
pub use projection::Projection;
pub use projectors::{CheckoutProjector, ItemProjector};
pub use read_model::{CheckoutRecord, CheckoutRecordStore, CheckpointStore, ItemRow, ItemRowStore};
