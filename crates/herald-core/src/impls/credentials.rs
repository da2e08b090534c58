//! StaticCredentials - a fixed owner -> credentials map.
//!
//! Stands in for the account store in the CLI (one token from config) and in
//! tests (per-owner tokens, or none to exercise configuration errors).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::OwnerId;
use crate::error::Result;
use crate::ports::{CredentialStore, Credentials};

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    by_owner: HashMap<OwnerId, Credentials>,
    fallback: Option<Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every owner gets the same credentials.
    pub fn shared(credentials: Credentials) -> Self {
        Self {
            by_owner: HashMap::new(),
            fallback: Some(credentials),
        }
    }

    pub fn with_owner(mut self, owner: OwnerId, credentials: Credentials) -> Self {
        self.by_owner.insert(owner, credentials);
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn credentials_for(&self, owner: &OwnerId) -> Result<Option<Credentials>> {
        Ok(self
            .by_owner
            .get(owner)
            .or(self.fallback.as_ref())
            .cloned())
    }
}
