//! ActivityLog port - append-only audit trail.

use async_trait::async_trait;

use crate::domain::{ActivityRecord, ItemId};
use crate::error::Result;

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, record: ActivityRecord) -> Result<()>;

    /// Records for one item, oldest first.
    async fn for_item(&self, item_id: ItemId) -> Result<Vec<ActivityRecord>>;

    /// Latest records across all items, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>>;
}
