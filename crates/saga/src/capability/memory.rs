//! In-memory membership for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::MemberId;
use tokio::sync::RwLock;

use super::{MemberInfo, MemberStatus, MembershipCapability};
use crate::error::CapabilityError;

#[derive(Debug, Default)]
struct Members {
    by_id: HashMap<MemberId, MemberInfo>,
    unavailable: bool,
}

/// Membership capability backed by a map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMembership {
    members: Arc<RwLock<Members>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a member.
    pub async fn insert(&self, member: MemberInfo) {
        self.members
            .write()
            .await
            .by_id
            .insert(member.member_id, member);
    }

    /// Registers an active member with no fines and returns its id.
    pub async fn register_active(&self) -> MemberId {
        let member_id = MemberId::new();
        self.insert(MemberInfo {
            member_id,
            status: MemberStatus::Active,
            fine_balance: 0.0,
        })
        .await;
        member_id
    }

    /// Makes every lookup fail with `Unavailable` while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.members.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl MembershipCapability for InMemoryMembership {
    async fn get_member(&self, member_id: MemberId) -> Result<MemberInfo, CapabilityError> {
        let members = self.members.read().await;
        if members.unavailable {
            return Err(CapabilityError::Unavailable("membership offline".into()));
        }
        members
            .by_id
            .get(&member_id)
            .cloned()
            .ok_or_else(|| CapabilityError::NotFound {
                entity: "member",
                id: member_id.to_string(),
            })
    }
}
