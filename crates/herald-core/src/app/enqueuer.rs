//! Enqueuer - keeps exactly one live delay-queue job per scheduled item.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{ItemId, Job, JobId};
use crate::error::{HeraldError, Result};
use crate::ports::{Clock, DelayQueue, IdGenerator};

pub struct Enqueuer {
    queue: Arc<dyn DelayQueue>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Enqueuer {
    pub fn new(queue: Arc<dyn DelayQueue>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { queue, clock, ids }
    }

    /// Create the job that fires at `fire_at`, retiring any previous live job
    /// for the item. Jobs are replaced, never updated in place.
    pub async fn schedule(&self, item_id: ItemId, fire_at: DateTime<Utc>) -> Result<JobId> {
        let now = self.clock.now();
        if fire_at <= now {
            return Err(HeraldError::InvalidSchedule(format!(
                "fire time {fire_at} is not after now ({now})"
            )));
        }

        let job = Job::new(self.ids.generate_job_id(), item_id, fire_at, now);
        let job_id = job.id;
        let retired = self.queue.enqueue_replacing(job).await?;
        info!(item_id = %item_id, job_id = %job_id, %fire_at, retired, "job scheduled");
        Ok(job_id)
    }

    /// Retract the item's live job. Nothing to remove is not an error.
    pub async fn cancel(&self, item_id: ItemId) -> Result<usize> {
        let removed = self.queue.remove_live(item_id).await?;
        if removed > 0 {
            info!(item_id = %item_id, removed, "job cancelled");
        }
        Ok(removed)
    }

    /// Re-arm after a retryable failure: push the live job (usually the one a
    /// consumer holds active) back to `fire_at`, or create one when the
    /// attempt came from a path without a job.
    pub async fn rearm(
        &self,
        item_id: ItemId,
        fire_at: DateTime<Utc>,
        last_error: Option<&str>,
    ) -> Result<JobId> {
        let now = self.clock.now();
        if let Some(job) = self.queue.live_job_for(item_id).await?
            && self.queue.requeue(job.id, fire_at, last_error, now).await?
        {
            info!(item_id = %item_id, job_id = %job.id, %fire_at, "job requeued");
            return Ok(job.id);
        }

        let mut job = Job::new(self.ids.generate_job_id(), item_id, fire_at, now);
        job.last_error = last_error.map(str::to_string);
        let job_id = job.id;
        self.queue.enqueue_replacing(job).await?;
        info!(item_id = %item_id, job_id = %job_id, %fire_at, "job re-created for retry");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::queue::InMemoryDelayQueue;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn enqueuer() -> (Enqueuer, InMemoryDelayQueue) {
        let queue = InMemoryDelayQueue::new();
        let clock = FixedClock::new(t0());
        let enqueuer = Enqueuer::new(
            Arc::new(queue.clone()),
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock)),
        );
        (enqueuer, queue)
    }

    #[tokio::test]
    async fn schedule_requires_a_future_time() {
        let (enqueuer, queue) = enqueuer();
        let item_id = ItemId::from_ulid(Ulid::new());

        let err = enqueuer.schedule(item_id, t0()).await.unwrap_err();
        assert!(matches!(err, HeraldError::InvalidSchedule(_)));
        assert!(queue.live_job_for(item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_without_job_is_zero() {
        let (enqueuer, _) = enqueuer();
        assert_eq!(enqueuer.cancel(ItemId::from_ulid(Ulid::new())).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rearm_requeues_the_active_job() {
        let (enqueuer, queue) = enqueuer();
        let item_id = ItemId::from_ulid(Ulid::new());
        let job_id = enqueuer
            .schedule(item_id, t0() + Duration::seconds(1))
            .await
            .unwrap();
        queue.mark_active(job_id, t0()).await.unwrap();

        let retry_at = t0() + Duration::seconds(5);
        let rearmed = enqueuer.rearm(item_id, retry_at, Some("503")).await.unwrap();

        assert_eq!(rearmed, job_id);
        let job = queue.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.fire_at, retry_at);
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn rearm_creates_a_job_when_none_is_live() {
        let (enqueuer, queue) = enqueuer();
        let item_id = ItemId::from_ulid(Ulid::new());

        let job_id = enqueuer.rearm(item_id, t0(), None).await.unwrap();
        let live = queue.live_job_for(item_id).await.unwrap().unwrap();
        assert_eq!(live.id, job_id);
        assert!(live.is_due(t0()));
    }
}
