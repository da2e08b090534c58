//! Reconciler - resolves items stuck in `publishing`.
//!
//! Two kinds of item end up here: ones whose publish call had an ambiguous
//! outcome (timeout, unreadable response), and ones whose claim is older than
//! `stale_claim_after` (the publisher crashed mid-call). Neither may be
//! retried blindly, so the remote side is asked first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::engine::PublicationEngine;
use super::enqueuer::Enqueuer;
use crate::domain::{
    ActivityRecord, AttemptOutcome, ErrorKind, ItemError, Origin, ScheduledItem, SweepReport,
};
use crate::error::Result;
use crate::ports::clock::{after, before};
use crate::ports::{
    ActivityLog, Clock, CredentialStore, IdGenerator, ItemStore, Lookup, PublishApi,
};
use crate::queue::RetryPolicy;

pub struct Reconciler {
    items: Arc<dyn ItemStore>,
    api: Arc<dyn PublishApi>,
    credentials: Arc<dyn CredentialStore>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    enqueuer: Enqueuer,
    retry: RetryPolicy,
    stale_claim_after: Duration,
    lookup_timeout: Duration,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(engine: &PublicationEngine) -> Self {
        Self {
            items: Arc::clone(&engine.items),
            api: Arc::clone(&engine.api),
            credentials: Arc::clone(&engine.credentials),
            activity: Arc::clone(&engine.activity),
            clock: Arc::clone(&engine.clock),
            ids: Arc::clone(&engine.ids),
            enqueuer: engine.enqueuer(),
            retry: engine.settings.retry.clone(),
            stale_claim_after: engine.settings.stale_claim_after,
            lookup_timeout: engine.settings.publish_timeout,
            batch_size: engine.settings.batch_size,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::new(Origin::Reconciler);
        let now = self.clock.now();
        let stale_before = before(now, self.stale_claim_after);
        let unresolved = self.items.find_unresolved(stale_before, self.batch_size).await?;

        for item in unresolved {
            match self.resolve(&item, now).await {
                Ok(outcome) => {
                    report.tally(&outcome);
                    self.record(&item, &outcome).await;
                }
                Err(err) => {
                    error!(item_id = %item.id, error = %err, "reconciliation failed");
                    report.record_error(item.id, err);
                }
            }
        }

        if report.processed() > 0 || !report.errors.is_empty() {
            info!(
                published = report.published,
                retried = report.retried,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors.len(),
                "reconciliation finished"
            );
        }
        Ok(report)
    }

    async fn resolve(&self, item: &ScheduledItem, now: DateTime<Utc>) -> Result<AttemptOutcome> {
        let lookup = match self.credentials.credentials_for(&item.owner_id).await? {
            Some(credentials) => {
                match tokio::time::timeout(self.lookup_timeout, self.api.lookup(&credentials, item.id))
                    .await
                {
                    Ok(Ok(lookup)) => lookup,
                    Ok(Err(e)) => {
                        warn!(item_id = %item.id, error = %e, "lookup failed");
                        Lookup::Unknown
                    }
                    Err(_) => {
                        warn!(item_id = %item.id, "lookup timed out");
                        Lookup::Unknown
                    }
                }
            }
            None => {
                let error = ItemError::new(
                    ErrorKind::Configuration,
                    format!("no publishing credentials for owner {}", item.owner_id),
                );
                if !self
                    .items
                    .mark_failed(item.id, item.attempts, &error, now)
                    .await?
                {
                    return Ok(AttemptOutcome::ClaimLost);
                }
                error!(item_id = %item.id, %error, "cannot reconcile without credentials");
                return Ok(AttemptOutcome::Failed { error });
            }
        };

        match lookup {
            Lookup::Found(external_id) => {
                if !self.items.finalize_published(item.id, &external_id, now).await? {
                    return Ok(AttemptOutcome::ClaimLost);
                }
                info!(item_id = %item.id, %external_id, "reconciled as published");
                Ok(AttemptOutcome::Published { external_id })
            }
            Lookup::Absent => {
                // Nothing was posted, so another attempt cannot duplicate it.
                // The unresolved call still counts against the retry budget.
                let attempts = item.attempts + 1;
                if !self.retry.allows_retry(attempts) {
                    let error = ItemError::new(
                        ErrorKind::Transient,
                        format!("publishing service unreachable after {attempts} attempts"),
                    );
                    if !self.items.mark_failed(item.id, attempts, &error, now).await? {
                        return Ok(AttemptOutcome::ClaimLost);
                    }
                    warn!(item_id = %item.id, attempts, "reconciled as not published; retries exhausted");
                    return Ok(AttemptOutcome::Failed { error });
                }

                let error = ItemError::new(
                    ErrorKind::Transient,
                    "previous attempt did not reach the publishing service",
                );
                let fire_at = after(now, self.retry.delay_for(attempts));
                if !self
                    .items
                    .rearm(item.id, fire_at, attempts, Some(&error), now)
                    .await?
                {
                    return Ok(AttemptOutcome::ClaimLost);
                }
                self.enqueuer
                    .rearm(item.id, fire_at, Some(&error.to_string()))
                    .await?;
                info!(item_id = %item.id, attempts, %fire_at, "reconciled as not published; re-armed");
                Ok(AttemptOutcome::Retrying {
                    fire_at,
                    attempts,
                    error,
                })
            }
            Lookup::Unknown => {
                let error = ItemError::new(
                    ErrorKind::Ambiguous,
                    "could not confirm whether the post was published; check the account before rescheduling",
                );
                if !self
                    .items
                    .mark_failed(item.id, item.attempts, &error, now)
                    .await?
                {
                    return Ok(AttemptOutcome::ClaimLost);
                }
                warn!(item_id = %item.id, "reconciliation inconclusive; item failed for operator review");
                Ok(AttemptOutcome::Failed { error })
            }
        }
    }

    async fn record(&self, item: &ScheduledItem, outcome: &AttemptOutcome) {
        let record = ActivityRecord::from_outcome(
            self.ids.generate_activity_id(),
            item.id,
            Origin::Reconciler,
            outcome,
            self.clock.now(),
        );
        if let Err(e) = self.activity.append(record).await {
            warn!(item_id = %item.id, error = %e, "failed to append activity record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineSettings;
    use crate::domain::{ItemId, ItemStatus, OwnerId, PublishError};
    use crate::impls::{InMemoryActivityLog, InMemoryItemStore, ScriptedPublishApi, StaticCredentials};
    use crate::ports::{Credentials, DelayQueue, FixedClock};
    use crate::queue::InMemoryDelayQueue;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        engine: PublicationEngine,
        clock: FixedClock,
        queue: InMemoryDelayQueue,
        api: ScriptedPublishApi,
    }

    fn fixture(api: ScriptedPublishApi) -> Fixture {
        let clock = FixedClock::new(t0());
        let queue = InMemoryDelayQueue::new();
        let engine = PublicationEngine::builder()
            .items(InMemoryItemStore::new())
            .queue(queue.clone())
            .publish_api(api.clone())
            .credentials(StaticCredentials::shared(Credentials::new("t")))
            .activity(InMemoryActivityLog::new())
            .clock(clock.clone())
            .build()
            .unwrap();
        Fixture {
            engine,
            clock,
            queue,
            api,
        }
    }

    /// Schedule, advance to the fire time and attempt once (ambiguous).
    async fn ambiguous_item(f: &Fixture) -> ItemId {
        let item = f.engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        f.engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(1));
        let outcome = f.engine.attempt_publish(item.id, Origin::Manual).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Ambiguous { .. }));
        item.id
    }

    #[tokio::test]
    async fn remote_post_found_is_finalized_without_a_second_call() {
        let f = fixture(
            ScriptedPublishApi::failing(1, PublishError::ambiguous("timed out"))
                .with_lookup(Lookup::Found(crate::domain::ExternalId::new("remote-1"))),
        );
        let id = ambiguous_item(&f).await;

        let report = f.engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.published, 1);
        let item = f.engine.item(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Published);
        assert_eq!(item.external_id.unwrap().as_str(), "remote-1");
        assert_eq!(f.api.calls(), 1);
    }

    #[tokio::test]
    async fn absent_post_is_rearmed_and_retried_once() {
        let f = fixture(ScriptedPublishApi::failing(
            1,
            PublishError::ambiguous("connection reset"),
        ));
        let id = ambiguous_item(&f).await;

        let report = f.engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.retried, 1);
        let item = f.engine.item(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Scheduled);
        assert_eq!(item.attempts, 1);
        let job = f.queue.live_job_for(id).await.unwrap().unwrap();
        assert_eq!(job.fire_at, f.clock.now() + chrono::Duration::seconds(4));

        // Not before the backoff elapses.
        let sweep = f.engine.consumer().sweep().await.unwrap();
        assert_eq!(sweep.processed(), 0);

        f.clock.advance(Duration::from_secs(4));
        let sweep = f.engine.consumer().sweep().await.unwrap();
        assert_eq!(sweep.published, 1);
        assert_eq!(f.api.calls(), 2);
    }

    #[tokio::test]
    async fn absent_post_fails_once_attempts_run_out() {
        let api = ScriptedPublishApi::failing(10, PublishError::ambiguous("connection reset"));
        let clock = FixedClock::new(t0());
        let engine = PublicationEngine::builder()
            .items(InMemoryItemStore::new())
            .queue(InMemoryDelayQueue::new())
            .publish_api(api.clone())
            .credentials(StaticCredentials::shared(Credentials::new("t")))
            .activity(InMemoryActivityLog::new())
            .clock(clock.clone())
            .settings(EngineSettings {
                retry: RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(60), 2),
                ..EngineSettings::default()
            })
            .build()
            .unwrap();
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));

        engine.attempt_publish(item.id, Origin::Manual).await.unwrap();
        assert_eq!(engine.reconciler().sweep().await.unwrap().retried, 1);

        clock.advance(Duration::from_secs(4));
        let second = engine.attempt_publish(item.id, Origin::Manual).await.unwrap();
        assert!(matches!(second, AttemptOutcome::Ambiguous { .. }));
        let report = engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.failed, 1);

        let item = engine.item(item.id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.attempts, 2);
        assert_eq!(item.last_error.unwrap().kind, ErrorKind::Transient);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_lookup_fails_the_item() {
        let f = fixture(
            ScriptedPublishApi::failing(1, PublishError::ambiguous("timed out"))
                .with_lookup(Lookup::Unknown),
        );
        let id = ambiguous_item(&f).await;

        let report = f.engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.failed, 1);
        let item = f.engine.item(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.last_error.unwrap().kind, ErrorKind::Ambiguous);
        assert_eq!(f.api.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_claims_are_left_alone() {
        let f = fixture(ScriptedPublishApi::new());
        let item = f.engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        f.engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(1));
        assert!(f.engine.claim_guard().claim(item.id).await.unwrap());

        let report = f.engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.processed(), 0);

        // Past the stale threshold, the abandoned claim is picked up.
        f.clock.advance(Duration::from_secs(301));
        let report = f.engine.reconciler().sweep().await.unwrap();
        assert_eq!(report.retried, 1);
    }
}
