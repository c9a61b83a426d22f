//! Checkout lifecycle.

use serde::{Deserialize, Serialize};

/// The status of a checkout record.
///
/// ```text
/// Active ──┬──► Returned
///          └──► Voided
/// ```
///
/// `Voided` is only reached when a failed checkout is compensated; the item
/// never left the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// The member has the item.
    Active,

    /// The item came back (terminal state).
    Returned,

    /// The checkout was undone (terminal state).
    Voided,
}

impl CheckoutStatus {
    /// Returns true if the item can be returned in this status.
    pub fn can_return(&self) -> bool {
        matches!(self, CheckoutStatus::Active)
    }

    /// Returns true if the checkout can be voided in this status.
    pub fn can_void(&self) -> bool {
        matches!(self, CheckoutStatus::Active)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckoutStatus::Active)
    }

    /// Returns the status name as stored in read models.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Active => "active",
            CheckoutStatus::Returned => "returned",
            CheckoutStatus::Voided => "voided",
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CheckoutStatus::Active),
            "returned" => Ok(CheckoutStatus::Returned),
            "voided" => Ok(CheckoutStatus::Voided),
            other => Err(format!("unknown checkout status: {other}")),
        }
    }
}
