//! In-memory delay queue implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ItemId, Job, JobId, JobState};
use crate::error::Result;
use crate::observability::JobCounts;
use crate::ports::DelayQueue;

/// Index entry for a sleeping job.
///
/// Ordered by fire time, then id, so iteration yields the earliest job first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledJob {
    fire_at: DateTime<Utc>,
    job_id: JobId,
}

impl ScheduledJob {
    fn of(job: &Job) -> Self {
        Self {
            fire_at: job.fire_at,
            job_id: job.id,
        }
    }
}

/// In-memory queue state.
#[derive(Default)]
struct InMemoryDelayQueueState {
    /// All job records (single source of truth for jobs).
    jobs: HashMap<JobId, Job>,

    /// Live job per item.
    live: HashMap<ItemId, JobId>,

    /// Jobs stored as `Delayed`, by fire time.
    scheduled: BTreeSet<ScheduledJob>,

    paused: bool,
}

impl InMemoryDelayQueueState {
    /// Drop a job from the live/scheduled indexes (the record stays).
    fn unindex(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get(&job_id) else {
            return;
        };
        self.scheduled.remove(&ScheduledJob::of(job));
        if self.live.get(&job.item_id) == Some(&job_id) {
            self.live.remove(&job.item_id);
        }
    }

    fn insert(&mut self, job: Job) {
        if job.state == JobState::Delayed {
            self.scheduled.insert(ScheduledJob::of(&job));
        }
        if job.state.is_live() {
            self.live.insert(job.item_id, job.id);
        }
        self.jobs.insert(job.id, job);
    }

    /// Remove the live job for an item entirely. Returns how many were removed.
    fn retire_live(&mut self, item_id: ItemId) -> usize {
        let Some(job_id) = self.live.get(&item_id).copied() else {
            return 0;
        };
        self.unindex(job_id);
        usize::from(self.jobs.remove(&job_id).is_some())
    }

    fn is_active(&self, job_id: JobId) -> bool {
        self.jobs
            .get(&job_id)
            .is_some_and(|job| job.state == JobState::Active)
    }

    /// Apply `f` to a job and re-index it afterwards.
    fn update<R>(&mut self, job_id: JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.unindex(job_id);
        let mut job = self.jobs.remove(&job_id)?;
        let result = f(&mut job);
        self.insert(job);
        Some(result)
    }

    fn counts(&self, now: DateTime<Utc>) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.jobs.values() {
            counts.record(job.state_at(now));
        }
        counts
    }
}

/// In-memory delay queue. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryDelayQueue {
    state: Arc<Mutex<InMemoryDelayQueueState>>,
}

impl InMemoryDelayQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelayQueue for InMemoryDelayQueue {
    async fn enqueue_replacing(&self, job: Job) -> Result<usize> {
        let mut state = self.state.lock().await;
        let retired = state.retire_live(job.item_id);
        state.insert(job);
        Ok(retired)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn live_job_for(&self, item_id: ItemId) -> Result<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .live
            .get(&item_id)
            .and_then(|id| state.jobs.get(id))
            .cloned())
    }

    async fn remove_live(&self, item_id: ItemId) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(state.retire_live(item_id))
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        // Sorted, so we can stop at the first future entry.
        let due = state
            .scheduled
            .iter()
            .take_while(|entry| entry.fire_at <= now)
            .filter_map(|entry| state.jobs.get(&entry.job_id))
            .take(limit)
            .cloned()
            .collect();
        Ok(due)
    }

    async fn mark_active(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let pickable = state
            .jobs
            .get(&id)
            .is_some_and(|job| matches!(job.state, JobState::Delayed | JobState::Waiting));
        if !pickable {
            return Ok(None);
        }
        Ok(state.update(id, |job| {
            job.start_attempt(now);
            job.clone()
        }))
    }

    async fn mark_completed(&self, id: JobId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_active(id) {
            state.update(id, |job| job.mark_completed(now));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: JobId, error: &str, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_active(id) {
            state.update(id, |job| job.mark_failed(error.to_string(), now));
        }
        Ok(())
    }

    async fn requeue(
        &self,
        id: JobId,
        fire_at: DateTime<Utc>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let live = state.jobs.get(&id).is_some_and(|job| job.state.is_live());
        if !live {
            return Ok(false);
        }
        state.update(id, |job| job.requeue(fire_at, error.map(str::to_string), now));
        Ok(true)
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<JobCounts> {
        let state = self.state.lock().await;
        Ok(state.counts(now))
    }

    async fn list(
        &self,
        job_state: JobState,
        now: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.state_at(now) == job_state)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.fire_at, job.id));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn purge(&self, finished_before: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.state.is_terminal() && job.finished_at.is_some_and(|at| at <= finished_before))
        });
        Ok(before - state.jobs.len())
    }

    async fn reset(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.jobs.len();
        *state = InMemoryDelayQueueState::default();
        Ok(removed)
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().await.paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.state.lock().await.paused = false;
        Ok(())
    }

    async fn is_paused(&self) -> Result<bool> {
        Ok(self.state.lock().await.paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job_for(item_id: ItemId, fire_in_secs: i64) -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            item_id,
            t0() + Duration::seconds(fire_in_secs),
            t0(),
        )
    }

    fn item() -> ItemId {
        ItemId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn enqueue_and_counts() {
        let queue = InMemoryDelayQueue::new();
        queue.enqueue_replacing(job_for(item(), 60)).await.unwrap();
        queue.enqueue_replacing(job_for(item(), 0)).await.unwrap();

        let counts = queue.counts(t0()).await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.waiting, 1);
    }

    #[tokio::test]
    async fn enqueue_replaces_the_live_job() {
        let queue = InMemoryDelayQueue::new();
        let item_id = item();
        let first = job_for(item_id, 60);
        let second = job_for(item_id, 120);

        assert_eq!(queue.enqueue_replacing(first.clone()).await.unwrap(), 0);
        assert_eq!(queue.enqueue_replacing(second.clone()).await.unwrap(), 1);

        assert!(queue.get(first.id).await.unwrap().is_none());
        let live = queue.live_job_for(item_id).await.unwrap().unwrap();
        assert_eq!(live.id, second.id);
        assert_eq!(queue.counts(t0()).await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn due_is_ordered_and_bounded() {
        let queue = InMemoryDelayQueue::new();
        let late = job_for(item(), 30);
        let early = job_for(item(), 10);
        let future = job_for(item(), 600);
        for job in [late.clone(), early.clone(), future] {
            queue.enqueue_replacing(job).await.unwrap();
        }

        let now = t0() + Duration::seconds(60);
        let due = queue.due(now, 10).await.unwrap();
        assert_eq!(
            due.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![early.id, late.id]
        );
        assert_eq!(queue.due(now, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_active_is_exclusive() {
        let queue = InMemoryDelayQueue::new();
        let job = job_for(item(), 0);
        queue.enqueue_replacing(job.clone()).await.unwrap();

        let active = queue.mark_active(job.id, t0()).await.unwrap().unwrap();
        assert_eq!(active.state, JobState::Active);
        assert_eq!(active.attempts_made, 1);
        assert!(queue.mark_active(job.id, t0()).await.unwrap().is_none());
        assert!(queue.due(t0(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finishing_ignores_jobs_that_are_not_active() {
        let queue = InMemoryDelayQueue::new();
        let job = job_for(item(), 0);
        queue.enqueue_replacing(job.clone()).await.unwrap();
        queue.mark_active(job.id, t0()).await.unwrap();

        // Another path requeued it before the holder finished.
        let retry_at = t0() + Duration::seconds(4);
        assert!(queue.requeue(job.id, retry_at, Some("503"), t0()).await.unwrap());
        queue.mark_completed(job.id, t0()).await.unwrap();
        queue.mark_failed(job.id, "lost", t0()).await.unwrap();

        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.last_error.as_deref(), Some("503"));
        assert!(stored.finished_at.is_none());
        assert_eq!(queue.due(retry_at, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn requeue_puts_active_job_back_to_sleep() {
        let queue = InMemoryDelayQueue::new();
        let job = job_for(item(), 0);
        queue.enqueue_replacing(job.clone()).await.unwrap();
        queue.mark_active(job.id, t0()).await.unwrap();

        let later = t0() + Duration::seconds(4);
        assert!(queue.requeue(job.id, later, Some("503"), t0()).await.unwrap());

        assert!(queue.due(t0(), 10).await.unwrap().is_empty());
        let due = queue.due(later, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts_made, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("503"));
    }

    #[tokio::test]
    async fn finished_jobs_are_not_live_and_can_be_purged() {
        let queue = InMemoryDelayQueue::new();
        let item_id = item();
        let job = job_for(item_id, 0);
        queue.enqueue_replacing(job.clone()).await.unwrap();
        queue.mark_active(job.id, t0()).await.unwrap();
        queue.mark_completed(job.id, t0()).await.unwrap();

        assert!(queue.live_job_for(item_id).await.unwrap().is_none());
        assert!(!queue.requeue(job.id, t0(), None, t0()).await.unwrap());
        assert_eq!(queue.remove_live(item_id).await.unwrap(), 0);

        assert_eq!(queue.purge(t0() - Duration::seconds(1)).await.unwrap(), 0);
        assert_eq!(queue.purge(t0()).await.unwrap(), 1);
        assert_eq!(queue.counts(t0()).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn list_filters_by_observed_state() {
        let queue = InMemoryDelayQueue::new();
        queue.enqueue_replacing(job_for(item(), 0)).await.unwrap();
        queue.enqueue_replacing(job_for(item(), 60)).await.unwrap();

        let waiting = queue.list(JobState::Waiting, t0(), 0, 10).await.unwrap();
        let delayed = queue.list(JobState::Delayed, t0(), 0, 10).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(delayed.len(), 1);
        assert!(queue.list(JobState::Delayed, t0(), 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pause_resume_and_reset() {
        let queue = InMemoryDelayQueue::new();
        queue.enqueue_replacing(job_for(item(), 0)).await.unwrap();
        queue.pause().await.unwrap();
        assert!(queue.is_paused().await.unwrap());
        queue.resume().await.unwrap();
        assert!(!queue.is_paused().await.unwrap());

        queue.pause().await.unwrap();
        assert_eq!(queue.reset().await.unwrap(), 1);
        assert!(!queue.is_paused().await.unwrap());
        assert_eq!(queue.counts(t0()).await.unwrap().total(), 0);
    }
}
