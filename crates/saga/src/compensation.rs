//! Compensation records bound to committed forward steps.

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

/// Undo instructions for one forward step.
///
/// Records are plain data so a run can be logged or inspected; the saga
/// interprets them when it compensates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compensation {
    /// Puts the item's available count back.
    ///
    /// The undo is applied as the inverse delta against whatever the item
    /// looks like when compensation runs, so unrelated changes made in
    /// between are kept.
    RestoreInventory {
        item_id: AggregateId,
        /// Change id the forward step tagged its event with.
        change_id: String,
        previous_available: u32,
        applied_available: u32,
        /// Version the forward step produced, or None if its outcome is
        /// unknown and the change id has to be checked first.
        applied_version: Option<Version>,
    },

    /// Voids a checkout, if one was recorded.
    VoidCheckout {
        checkout_id: AggregateId,
        reason: String,
    },
}

impl Compensation {
    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Compensation::RestoreInventory { .. } => "restore_inventory",
            Compensation::VoidCheckout { .. } => "void_checkout",
        }
    }

    /// Signed change to apply to the current available count.
    pub fn inventory_delta(&self) -> Option<i64> {
        match self {
            Compensation::RestoreInventory {
                previous_available,
                applied_available,
                ..
            } => Some(i64::from(*previous_available) - i64::from(*applied_available)),
            Compensation::VoidCheckout { .. } => None,
        }
    }
}

/// What happened when one compensation ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationOutcome {
    pub compensation: Compensation,
    /// None on success.
    pub error: Option<String>,
}

impl CompensationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
