//! Projectors that keep the current-state rows in step with the log.

pub mod checkout;
pub mod item;

pub use checkout::CheckoutProjector;
pub use item::ItemProjector;
