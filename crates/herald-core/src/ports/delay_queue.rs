//! DelayQueue port - holds one job per scheduled item.
//!
//! Jobs are hints that an item will become due. Losing one is recoverable
//! (the fallback scanner still finds the item); running one twice is harmless
//! (the claim decides).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ItemId, Job, JobId, JobState};
use crate::error::Result;
use crate::observability::JobCounts;

#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Retire any live job for `job.item_id` and insert `job`, atomically.
    /// Returns how many jobs were retired.
    async fn enqueue_replacing(&self, job: Job) -> Result<usize>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    async fn live_job_for(&self, item_id: ItemId) -> Result<Option<Job>>;

    /// Delete live jobs for `item_id`. Zero is not an error.
    async fn remove_live(&self, item_id: ItemId) -> Result<usize>;

    /// Delayed/waiting jobs with `fire_at <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>>;

    /// `delayed|waiting -> active`, incrementing `attempts_made`. `None` when
    /// another sweep already took the job (or it was retired).
    async fn mark_active(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// `active -> completed`. A job in any other state is left untouched:
    /// another path may already have requeued it.
    async fn mark_completed(&self, id: JobId, now: DateTime<Utc>) -> Result<()>;

    /// `active -> failed`; no-op otherwise.
    async fn mark_failed(&self, id: JobId, error: &str, now: DateTime<Utc>) -> Result<()>;

    /// Live job back to `delayed` until `fire_at`.
    async fn requeue(
        &self,
        id: JobId,
        fire_at: DateTime<Utc>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn counts(&self, now: DateTime<Utc>) -> Result<JobCounts>;

    /// Jobs currently in `state` (as observed at `now`).
    async fn list(
        &self,
        state: JobState,
        now: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Job>>;

    /// Delete completed/failed jobs finished at or before `finished_before`.
    async fn purge(&self, finished_before: DateTime<Utc>) -> Result<usize>;

    /// Delete every job and clear the paused flag.
    async fn reset(&self) -> Result<usize>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn is_paused(&self) -> Result<bool>;
}
