//! HTTP clients for catalog and membership services that run as separate
//! processes.

use std::time::Duration;

use async_trait::async_trait;
use common::{AggregateId, MemberId};
use event_store::Version;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{InventoryCapability, ItemAvailability, MemberInfo, MembershipCapability};
use crate::error::CapabilityError;

/// Where a remote service lives and how long a call may take.
#[derive(Debug, Clone)]
pub struct HttpCapabilityConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpCapabilityConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn client(&self) -> Result<Client, CapabilityError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

#[derive(Serialize)]
struct SetCopiesBody<'a> {
    total_copies: u32,
    available: u32,
    expected_version: Version,
    change_id: &'a str,
}

#[derive(Deserialize)]
struct ChangeStatus {
    applied: bool,
}

/// Maps non-success responses onto capability errors.
///
/// 404 is a missing entity, 409 a lost compare-and-set, 400 and 422 a
/// rejection. Anything else means the service could not answer.
async fn check_status(
    response: Response,
    entity: &'static str,
    id: String,
    item_id: Option<AggregateId>,
) -> Result<Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => CapabilityError::NotFound { entity, id },
        StatusCode::CONFLICT => match item_id {
            Some(item_id) => CapabilityError::ConcurrencyConflict { item_id },
            None => CapabilityError::Rejected(body),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CapabilityError::Rejected(body)
        }
        other => CapabilityError::Unavailable(format!("{entity} service returned {other}")),
    })
}

/// Inventory capability backed by the catalog service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(config: &HttpCapabilityConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: config.client()?,
            base_url: config.base_url.clone(),
        })
    }

    fn item_url(&self, item_id: AggregateId) -> String {
        format!("{}/items/{item_id}", self.base_url)
    }
}

#[async_trait]
impl InventoryCapability for HttpInventoryClient {
    #[tracing::instrument(skip(self))]
    async fn get_item(&self, item_id: AggregateId) -> Result<ItemAvailability, CapabilityError> {
        let response = self.client.get(self.item_url(item_id)).send().await?;
        let response = check_status(response, "item", item_id.to_string(), None).await?;
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn set_copies(
        &self,
        item_id: AggregateId,
        total_copies: u32,
        available: u32,
        expected_version: Version,
        change_id: &str,
    ) -> Result<Version, CapabilityError> {
        let body = SetCopiesBody {
            total_copies,
            available,
            expected_version,
            change_id,
        };
        let response = self
            .client
            .patch(self.item_url(item_id))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, "item", item_id.to_string(), Some(item_id)).await?;

        let item: ItemAvailability = response.json().await?;
        Ok(item.version)
    }

    #[tracing::instrument(skip(self))]
    async fn change_applied(
        &self,
        item_id: AggregateId,
        change_id: &str,
    ) -> Result<bool, CapabilityError> {
        let url = format!("{}/changes/{change_id}", self.item_url(item_id));
        let response = self.client.get(url).send().await?;
        let response = check_status(response, "item", item_id.to_string(), None).await?;

        let status: ChangeStatus = response.json().await?;
        Ok(status.applied)
    }
}

/// Membership capability backed by the membership service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpMembershipClient {
    client: Client,
    base_url: String,
}

impl HttpMembershipClient {
    pub fn new(config: &HttpCapabilityConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: config.client()?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl MembershipCapability for HttpMembershipClient {
    #[tracing::instrument(skip(self))]
    async fn get_member(&self, member_id: MemberId) -> Result<MemberInfo, CapabilityError> {
        let url = format!("{}/members/{member_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        let response = check_status(response, "member", member_id.to_string(), None).await?;
        Ok(response.json().await?)
    }
}
