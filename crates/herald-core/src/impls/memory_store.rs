//! InMemoryItemStore - item store for tests and the demo.
//!
//! Every conditional update checks its predicate and writes under a single
//! lock acquisition, which gives the same compare-and-set semantics as the
//! SQLite `UPDATE ... WHERE status = ?` statements.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ErrorKind, ExternalId, ItemError, ItemId, ItemStatus, OwnerId, ScheduledItem,
};
use crate::error::{HeraldError, Result};
use crate::ports::ItemStore;

#[derive(Clone, Default)]
pub struct InMemoryItemStore {
    items: Arc<Mutex<HashMap<ItemId, ScheduledItem>>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ItemId, ScheduledItem>>> {
        self.items
            .lock()
            .map_err(|e| HeraldError::Store(format!("item store lock poisoned: {e}")))
    }

    /// Apply `f` when the item exists and `guard` holds. Returns whether it did.
    fn update_if(
        &self,
        id: ItemId,
        guard: impl FnOnce(&ScheduledItem) -> bool,
        f: impl FnOnce(&mut ScheduledItem),
    ) -> Result<bool> {
        let mut items = self.lock()?;
        let Some(item) = items.get_mut(&id) else {
            return Ok(false);
        };
        if !guard(item) {
            return Ok(false);
        }
        f(item);
        Ok(true)
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn insert(&self, item: ScheduledItem) -> Result<()> {
        self.lock()?.insert(item.id, item);
        Ok(())
    }

    async fn get(&self, id: ItemId) -> Result<Option<ScheduledItem>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        owner: Option<&OwnerId>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>> {
        let items = self.lock()?;
        let mut due: Vec<ScheduledItem> = items
            .values()
            .filter(|item| item.is_due(now))
            .filter(|item| owner.is_none_or(|o| &item.owner_id == o))
            .cloned()
            .collect();
        due.sort_by_key(|item| (item.scheduled_for, item.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn set_schedule(&self, id: ItemId, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status.is_schedulable(),
            |item| {
                item.status = ItemStatus::Scheduled;
                item.scheduled_for = Some(at);
                item.attempts = 0;
                item.last_error = None;
                item.updated_at = now;
            },
        )
    }

    async fn unschedule(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status == ItemStatus::Scheduled,
            |item| {
                item.status = ItemStatus::Draft;
                item.scheduled_for = None;
                item.updated_at = now;
            },
        )
    }

    async fn claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        self.update_if(
            id,
            |item| item.is_due(now),
            |item| {
                item.status = ItemStatus::Publishing;
                item.updated_at = now;
            },
        )
    }

    async fn finalize_published(
        &self,
        id: ItemId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status == ItemStatus::Publishing && item.external_id.is_none(),
            |item| {
                item.status = ItemStatus::Published;
                item.external_id = Some(external_id.clone());
                item.published_at = Some(now);
                item.last_error = None;
                item.updated_at = now;
            },
        )
    }

    async fn rearm(
        &self,
        id: ItemId,
        fire_at: DateTime<Utc>,
        attempts: u32,
        error: Option<&ItemError>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status == ItemStatus::Publishing,
            |item| {
                item.status = ItemStatus::Scheduled;
                item.scheduled_for = Some(fire_at);
                item.attempts = attempts;
                item.last_error = error.cloned();
                item.updated_at = now;
            },
        )
    }

    async fn mark_failed(
        &self,
        id: ItemId,
        attempts: u32,
        error: &ItemError,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status == ItemStatus::Publishing,
            |item| {
                item.status = ItemStatus::Failed;
                item.scheduled_for = None;
                item.attempts = attempts;
                item.last_error = Some(error.clone());
                item.updated_at = now;
            },
        )
    }

    async fn flag_ambiguous(&self, id: ItemId, error: &ItemError, now: DateTime<Utc>) -> Result<bool> {
        self.update_if(
            id,
            |item| item.status == ItemStatus::Publishing,
            |item| {
                item.last_error = Some(error.clone());
                item.updated_at = now;
            },
        )
    }

    async fn find_unresolved(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>> {
        let items = self.lock()?;
        let mut unresolved: Vec<ScheduledItem> = items
            .values()
            .filter(|item| item.status == ItemStatus::Publishing)
            .filter(|item| {
                item.last_error
                    .as_ref()
                    .is_some_and(|e| e.kind == ErrorKind::Ambiguous)
                    || item.updated_at <= stale_before
            })
            .cloned()
            .collect();
        unresolved.sort_by_key(|item| (item.updated_at, item.id));
        unresolved.truncate(limit);
        Ok(unresolved)
    }
}
