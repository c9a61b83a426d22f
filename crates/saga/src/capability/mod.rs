//! Narrow interfaces the saga uses to read and change aggregates it does
//! not own.

mod http;
mod local;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, MemberId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

pub use http::{HttpCapabilityConfig, HttpInventoryClient, HttpMembershipClient};
pub use local::LocalInventory;
pub use memory::InMemoryMembership;

/// Standing of a library member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Suspended,
    Expired,
}

/// What the saga needs to know about a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(rename = "id")]
    pub member_id: MemberId,
    pub status: MemberStatus,
    /// Unpaid fines.
    pub fine_balance: f64,
}

impl MemberInfo {
    /// Active members with no unpaid fines may borrow.
    pub fn can_borrow(&self) -> bool {
        self.status == MemberStatus::Active && self.fine_balance <= 0.0
    }
}

/// Copy counts of an item at a given version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAvailability {
    #[serde(rename = "id")]
    pub item_id: AggregateId,
    pub total_copies: u32,
    pub available: u32,
    pub version: Version,
}

/// Reads and changes item copy counts.
#[async_trait]
pub trait InventoryCapability: Send + Sync {
    async fn get_item(&self, item_id: AggregateId) -> Result<ItemAvailability, CapabilityError>;

    /// Sets absolute counts if the item is still at `expected_version`.
    /// `change_id` is recorded with the change so [`change_applied`] can
    /// find it.
    ///
    /// [`change_applied`]: InventoryCapability::change_applied
    async fn set_copies(
        &self,
        item_id: AggregateId,
        total_copies: u32,
        available: u32,
        expected_version: Version,
        change_id: &str,
    ) -> Result<Version, CapabilityError>;

    /// Returns true if a change tagged `change_id` was committed.
    async fn change_applied(
        &self,
        item_id: AggregateId,
        change_id: &str,
    ) -> Result<bool, CapabilityError>;
}

/// Reads member standing.
#[async_trait]
pub trait MembershipCapability: Send + Sync {
    async fn get_member(&self, member_id: MemberId) -> Result<MemberInfo, CapabilityError>;
}

#[async_trait]
impl<T: InventoryCapability + ?Sized> InventoryCapability for Arc<T> {
    async fn get_item(&self, item_id: AggregateId) -> Result<ItemAvailability, CapabilityError> {
        (**self).get_item(item_id).await
    }

    async fn set_copies(
        &self,
        item_id: AggregateId,
        total_copies: u32,
        available: u32,
        expected_version: Version,
        change_id: &str,
    ) -> Result<Version, CapabilityError> {
        (**self)
            .set_copies(item_id, total_copies, available, expected_version, change_id)
            .await
    }

    async fn change_applied(
        &self,
        item_id: AggregateId,
        change_id: &str,
    ) -> Result<bool, CapabilityError> {
        (**self).change_applied(item_id, change_id).await
    }
}

#[async_trait]
impl<T: MembershipCapability + ?Sized> MembershipCapability for Arc<T> {
    async fn get_member(&self, member_id: MemberId) -> Result<MemberInfo, CapabilityError> {
        (**self).get_member(member_id).await
    }
}
