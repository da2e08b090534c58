//! CredentialStore port - per-owner delivery credentials (owned externally).

use async_trait::async_trait;

use crate::domain::OwnerId;
use crate::error::Result;
use crate::ports::publish_api::Credentials;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` means the owner never connected an account; the publisher
    /// treats that as a configuration error.
    async fn credentials_for(&self, owner: &OwnerId) -> Result<Option<Credentials>>;
}
