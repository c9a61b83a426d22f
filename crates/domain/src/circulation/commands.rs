//! Circulation commands.

use chrono::Duration;
use common::{AggregateId, MemberId};

use crate::command::Command;

use super::Checkout;

/// Command to open a new checkout.
#[derive(Debug, Clone)]
pub struct CheckOutItem {
    pub checkout_id: AggregateId,
    pub member_id: MemberId,
    pub item_id: AggregateId,
    pub loan_period: Duration,
}

impl CheckOutItem {
    /// Creates a new CheckOutItem command with a generated checkout ID.
    pub fn new(member_id: MemberId, item_id: AggregateId, loan_period: Duration) -> Self {
        Self {
            checkout_id: AggregateId::new(),
            member_id,
            item_id,
            loan_period,
        }
    }
}

impl Command for CheckOutItem {
    type Aggregate = Checkout;

    fn aggregate_id(&self) -> AggregateId {
        self.checkout_id
    }
}

/// Command to close a checkout because the item came back.
#[derive(Debug, Clone)]
pub struct ReturnCheckout {
    pub checkout_id: AggregateId,
}

impl ReturnCheckout {
    pub fn new(checkout_id: AggregateId) -> Self {
        Self { checkout_id }
    }
}

impl Command for ReturnCheckout {
    type Aggregate = Checkout;

    fn aggregate_id(&self) -> AggregateId {
        self.checkout_id
    }
}

/// Command to undo a checkout.
#[derive(Debug, Clone)]
pub struct VoidCheckout {
    pub checkout_id: AggregateId,
    pub reason: String,
}

impl VoidCheckout {
    pub fn new(checkout_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            checkout_id,
            reason: reason.into(),
        }
    }
}

impl Command for VoidCheckout {
    type Aggregate = Checkout;

    fn aggregate_id(&self) -> AggregateId {
        self.checkout_id
    }
}
