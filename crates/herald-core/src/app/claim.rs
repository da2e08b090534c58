//! ClaimGuard - the only synchronization primitive.
//!
//! A claim is one conditional update in the item store:
//! `status = publishing WHERE id = ? AND status = scheduled AND scheduled_for <= now`.
//! Of any number of concurrent callers, at most one sees `true`.

use std::sync::Arc;

use tracing::debug;

use crate::domain::ItemId;
use crate::error::Result;
use crate::ports::{Clock, ItemStore};

pub struct ClaimGuard {
    items: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
}

impl ClaimGuard {
    pub fn new(items: Arc<dyn ItemStore>, clock: Arc<dyn Clock>) -> Self {
        Self { items, clock }
    }

    /// `Ok(false)` when the item is not due, already claimed, withdrawn, or
    /// missing. Losing is not an error.
    pub async fn claim(&self, item_id: ItemId) -> Result<bool> {
        let won = self.items.claim(item_id, self.clock.now()).await?;
        debug!(item_id = %item_id, won, "claim attempted");
        Ok(won)
    }
}
