//! Circulation domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, MemberId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a checkout aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    /// A member took an item home.
    ItemCheckedOut(ItemCheckedOutData),

    /// The item came back.
    ItemReturned(ItemReturnedData),

    /// The checkout was undone by a compensating action.
    CheckoutVoided(CheckoutVoidedData),
}

impl DomainEvent for CheckoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::ItemCheckedOut(_) => "ItemCheckedOut",
            CheckoutEvent::ItemReturned(_) => "ItemReturned",
            CheckoutEvent::CheckoutVoided(_) => "CheckoutVoided",
        }
    }
}

/// Data for ItemCheckedOut event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCheckedOutData {
    pub checkout_id: AggregateId,
    pub member_id: MemberId,
    pub item_id: AggregateId,
    pub checkout_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Data for ItemReturned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReturnedData {
    pub checkout_id: AggregateId,
    pub member_id: MemberId,
    pub item_id: AggregateId,
    pub return_date: DateTime<Utc>,
}

/// Data for CheckoutVoided event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutVoidedData {
    pub voided_at: DateTime<Utc>,
    pub reason: String,
}

impl CheckoutEvent {
    /// Creates a CheckoutVoided event.
    pub fn checkout_voided(reason: impl Into<String>) -> Self {
        CheckoutEvent::CheckoutVoided(CheckoutVoidedData {
            voided_at: Utc::now(),
            reason: reason.into(),
        })
    }
}
