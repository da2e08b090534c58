//! PublishApi port - the external publishing call, treated as opaque.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ExternalId, ItemId, OwnerId, PublishError, ScheduledItem};

/// Delivery credentials for one owner.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Sent as the idempotency / client reference key.
    pub item_id: ItemId,
    pub owner_id: OwnerId,
    pub content: String,
}

impl From<&ScheduledItem> for PublishRequest {
    fn from(item: &ScheduledItem) -> Self {
        Self {
            item_id: item.id,
            owner_id: item.owner_id.clone(),
            content: item.content.clone(),
        }
    }
}

/// What the external system knows about an item, for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The post exists remotely.
    Found(ExternalId),
    /// The remote side confirms there is no such post.
    Absent,
    /// The API cannot answer.
    Unknown,
}

#[async_trait]
pub trait PublishApi: Send + Sync {
    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
    ) -> Result<ExternalId, PublishError>;

    /// Look up a post by the item id it was published for.
    async fn lookup(
        &self,
        _credentials: &Credentials,
        _item_id: ItemId,
    ) -> Result<Lookup, PublishError> {
        Ok(Lookup::Unknown)
    }
}
