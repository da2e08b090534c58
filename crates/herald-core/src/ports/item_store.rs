//! ItemStore port - the source of truth for items.
//!
//! Every mutation is a single conditional update on one row: the call reports
//! whether the predicate matched (`Ok(false)` means "someone else got there
//! first", never an error). No method holds a lock beyond the statement, so a
//! crashed caller cannot wedge an item.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExternalId, ItemError, ItemId, OwnerId, ScheduledItem};
use crate::error::Result;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert(&self, item: ScheduledItem) -> Result<()>;

    async fn get(&self, id: ItemId) -> Result<Option<ScheduledItem>>;

    /// `status = scheduled AND scheduled_for <= now`, oldest first, optionally
    /// restricted to one owner.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        owner: Option<&OwnerId>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>>;

    /// `draft | scheduled | failed -> scheduled` at `at`. Resets the attempt
    /// counter and last error.
    async fn set_schedule(&self, id: ItemId, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool>;

    /// `scheduled -> draft`. Fails (returns false) once a claim has won.
    async fn unschedule(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool>;

    /// The claim primitive:
    /// `status = publishing WHERE id = ? AND status = scheduled AND scheduled_for <= now`.
    async fn claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool>;

    /// `publishing -> published`, only while `external_id` is still unset.
    async fn finalize_published(
        &self,
        id: ItemId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `publishing -> scheduled` at `fire_at` after a retryable failure.
    async fn rearm(
        &self,
        id: ItemId,
        fire_at: DateTime<Utc>,
        attempts: u32,
        error: Option<&ItemError>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `publishing -> failed`.
    async fn mark_failed(
        &self,
        id: ItemId,
        attempts: u32,
        error: &ItemError,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Keeps the item in `publishing` and records the ambiguous error.
    async fn flag_ambiguous(&self, id: ItemId, error: &ItemError, now: DateTime<Utc>) -> Result<bool>;

    /// Items in `publishing` that are flagged ambiguous or were last touched
    /// at or before `stale_before`.
    async fn find_unresolved(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>>;
}
