//! Checkout aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;

pub use aggregate::Checkout;
pub use commands::{CheckOutItem, ReturnCheckout, VoidCheckout};
pub use events::{CheckoutEvent, CheckoutVoidedData, ItemCheckedOutData, ItemReturnedData};
pub use service::CirculationService;
pub use status::CheckoutStatus;

use thiserror::Error;

/// Errors that can occur during checkout operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// No checkout with this id exists.
    #[error("Checkout not found")]
    NotFound,

    /// The checkout id is already taken.
    #[error("Checkout already exists")]
    AlreadyExists,

    /// Loan periods must be positive.
    #[error("Loan period must be positive")]
    InvalidLoanPeriod,

    /// The checkout is no longer active.
    #[error("Checkout is {status}")]
    NotActive { status: CheckoutStatus },
}
