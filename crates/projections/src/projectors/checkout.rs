//! Checkout records from circulation events.

use async_trait::async_trait;
use domain::{Aggregate, Checkout, CheckoutEvent, CheckoutStatus};
use event_store::EventEnvelope;

use crate::projection::Projection;
use crate::read_model::{CheckoutRecord, CheckoutRecordStore};
use crate::{ProjectionError, Result};

/// Maintains one [`CheckoutRecord`] per checkout aggregate.
///
/// The saga writes records itself right after appending, so most events
/// reach this projector after the row is already current and are skipped.
#[derive(Clone)]
pub struct CheckoutProjector<R> {
    records: R,
}

impl<R: CheckoutRecordStore> CheckoutProjector<R> {
    pub fn new(records: R) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &R {
        &self.records
    }
}

#[async_trait]
impl<R: CheckoutRecordStore> Projection for CheckoutProjector<R> {
    fn name(&self) -> &'static str {
        "checkouts"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Checkout::aggregate_type() {
            return Ok(());
        }

        let existing = self
            .records
            .get_checkout_record(event.aggregate_id)
            .await?;
        if existing
            .as_ref()
            .is_some_and(|record| record.version >= event.version)
        {
            return Ok(());
        }

        let mut record = match (event.decode::<CheckoutEvent>()?, existing) {
            (CheckoutEvent::ItemCheckedOut(data), _) => CheckoutRecord {
                checkout_id: data.checkout_id,
                member_id: data.member_id,
                item_id: data.item_id,
                status: CheckoutStatus::Active,
                checkout_date: data.checkout_date,
                due_date: data.due_date,
                return_date: None,
                version: event.version,
            },
            (CheckoutEvent::ItemReturned(data), Some(mut record)) => {
                record.status = CheckoutStatus::Returned;
                record.return_date = Some(data.return_date);
                record
            }
            (CheckoutEvent::CheckoutVoided(_), Some(mut record)) => {
                record.status = CheckoutStatus::Voided;
                record
            }
            (_, None) => {
                return Err(ProjectionError::MissingRow {
                    aggregate_type: Checkout::aggregate_type(),
                    aggregate_id: event.aggregate_id.to_string(),
                });
            }
        };
        record.version = event.version;

        self.records.upsert_checkout_record(&record).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.records.clear_checkout_records().await
    }
}
