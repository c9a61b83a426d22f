//! Checkout aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, MemberId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    CheckoutError, CheckoutEvent, CheckoutStatus,
    events::{ItemCheckedOutData, ItemReturnedData},
};

/// Checkout aggregate root.
///
/// One stream per loan: created by `ItemCheckedOut`, closed by either
/// `ItemReturned` or `CheckoutVoided`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    member_id: Option<MemberId>,
    item_id: Option<AggregateId>,
    checkout_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    status: Option<CheckoutStatus>,
}

impl Aggregate for Checkout {
    type Event = CheckoutEvent;
    type Error = CheckoutError;

    fn aggregate_type() -> &'static str {
        "Checkout"
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
            CheckoutEvent::ItemCheckedOut(data) => self.apply_checked_out(data),
            CheckoutEvent::ItemReturned(ItemReturnedData { return_date, .. }) => {
                self.return_date = Some(return_date);
                self.status = Some(CheckoutStatus::Returned);
            }
            CheckoutEvent::CheckoutVoided(_) => {
                self.status = Some(CheckoutStatus::Voided);
            }
        }
    }
}

// Query methods
impl Checkout {
    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn item_id(&self) -> Option<AggregateId> {
        self.item_id
    }

    pub fn checkout_date(&self) -> Option<DateTime<Utc>> {
        self.checkout_date
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    /// Returns the status, or None before the item was checked out.
    pub fn status(&self) -> Option<CheckoutStatus> {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == Some(CheckoutStatus::Active)
    }
}

// Command methods (return events)
impl Checkout {
    /// Opens the loan. `now + loan_period` becomes the due date.
    pub fn check_out(
        &self,
        checkout_id: AggregateId,
        member_id: MemberId,
        item_id: AggregateId,
        now: DateTime<Utc>,
        loan_period: Duration,
    ) -> Result<Vec<CheckoutEvent>, CheckoutError> {
        if self.id.is_some() {
            return Err(CheckoutError::AlreadyExists);
        }
        if loan_period <= Duration::zero() {
            return Err(CheckoutError::InvalidLoanPeriod);
        }

        Ok(vec![CheckoutEvent::ItemCheckedOut(ItemCheckedOutData {
            checkout_id,
            member_id,
            item_id,
            checkout_date: now,
            due_date: now + loan_period,
        })])
    }

    /// Closes the loan because the item came back.
    pub fn return_item(&self, now: DateTime<Utc>) -> Result<Vec<CheckoutEvent>, CheckoutError> {
        let status = self.status.ok_or(CheckoutError::NotFound)?;
        if !status.can_return() {
            return Err(CheckoutError::NotActive { status });
        }
        let (Some(checkout_id), Some(member_id), Some(item_id)) =
            (self.id, self.member_id, self.item_id)
        else {
            return Err(CheckoutError::NotFound);
        };

        Ok(vec![CheckoutEvent::ItemReturned(ItemReturnedData {
            checkout_id,
            member_id,
            item_id,
            return_date: now,
        })])
    }

    /// Undoes the loan. Already voided checkouts produce no events.
    pub fn void(&self, reason: &str) -> Result<Vec<CheckoutEvent>, CheckoutError> {
        match self.status {
            None => Err(CheckoutError::NotFound),
            Some(CheckoutStatus::Voided) => Ok(vec![]),
            Some(status) if !status.can_void() => Err(CheckoutError::NotActive { status }),
            Some(_) => Ok(vec![CheckoutEvent::checkout_voided(reason)]),
        }
    }
}

// Event application
impl Checkout {
    fn apply_checked_out(&mut self, data: ItemCheckedOutData) {
        self.id = Some(data.checkout_id);
        self.member_id = Some(data.member_id);
        self.item_id = Some(data.item_id);
        self.checkout_date = Some(data.checkout_date);
        self.due_date = Some(data.due_date);
        self.return_date = None;
        self.status = Some(CheckoutStatus::Active);
    }
}
