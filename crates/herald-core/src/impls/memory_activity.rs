//! InMemoryActivityLog - append-only vector, for tests and the demo.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{ActivityRecord, ItemId};
use crate::error::{HeraldError, Result};
use crate::ports::ActivityLog;

#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    records: Arc<Mutex<Vec<ActivityRecord>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn all(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn append(&self, record: ActivityRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| HeraldError::Store(format!("activity log lock poisoned: {e}")))?
            .push(record);
        Ok(())
    }

    async fn for_item(&self, item_id: ItemId) -> Result<Vec<ActivityRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| HeraldError::Store(format!("activity log lock poisoned: {e}")))?;
        Ok(records
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| HeraldError::Store(format!("activity log lock poisoned: {e}")))?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
