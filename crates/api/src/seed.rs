//! Startup data for the in-process capabilities.
//!
//! Without remote services the membership directory and the catalog start
//! empty. A seed file fills them:
//!
//! ```json
//! {
//!   "members": [{ "id": "…", "status": "active", "fine_balance": 0.0 }],
//!   "items": [{ "id": "…", "isbn": "978-0441", "title": "Dune", "author": "Herbert", "total_copies": 2 }]
//! }
//! ```

use std::path::Path;

use common::AggregateId;
use domain::{AddItem, CatalogService, DomainError};
use event_store::EventStore;
use saga::{InMemoryMembership, MemberInfo};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or applying a seed.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read seed file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("seeding item {item_id} failed: {source}")]
    Item {
        item_id: AggregateId,
        #[source]
        source: DomainError,
    },
}

/// A catalog item to create at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedItem {
    #[serde(rename = "id")]
    pub item_id: AggregateId,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
}

/// Members and items loaded into the in-process capabilities.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub members: Vec<MemberInfo>,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

impl Seed {
    /// Reads a seed from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, SeedError> {
        let display = path.display().to_string();
        let raw = tokio::fs::read(path).await.map_err(|source| SeedError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| SeedError::Parse {
            path: display,
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.items.is_empty()
    }

    /// Adds every seeded member to `directory`.
    pub async fn apply_members(&self, directory: &InMemoryMembership) {
        for member in &self.members {
            directory.insert(member.clone()).await;
        }
        tracing::info!(members = self.members.len(), "membership directory seeded");
    }

    /// Adds seeded items that are not in the catalog yet. Items already
    /// present are left as they are, so restarting against a durable store
    /// is safe. Returns how many items were added.
    pub async fn apply_items<S: EventStore>(
        &self,
        catalog: &CatalogService<S>,
    ) -> Result<usize, SeedError> {
        let mut added = 0;
        for item in &self.items {
            let item_error = |source| SeedError::Item {
                item_id: item.item_id,
                source,
            };
            if catalog.get_item(item.item_id).await.map_err(item_error)?.is_some() {
                continue;
            }
            catalog
                .add_item(AddItem {
                    item_id: item.item_id,
                    isbn: item.isbn.clone(),
                    title: item.title.clone(),
                    author: item.author.clone(),
                    total_copies: item.total_copies,
                })
                .await
                .map_err(item_error)?;
            added += 1;
        }
        tracing::info!(added, seeded = self.items.len(), "catalog seeded");
        Ok(added)
    }
}
