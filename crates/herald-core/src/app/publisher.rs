//! Publisher - performs the external call for an item whose claim was won,
//! and moves the item to its next status based on the classified result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::engine::PublicationEngine;
use super::enqueuer::Enqueuer;
use crate::domain::{
    ActivityRecord, AttemptOutcome, ErrorKind, ExternalId, ItemError, ItemId, ItemStatus, Origin,
    PublishError, ScheduledItem,
};
use crate::error::{HeraldError, Result};
use crate::ports::clock::after;
use crate::ports::{
    ActivityLog, Clock, CredentialStore, IdGenerator, ItemStore, PublishApi, PublishRequest,
};
use crate::queue::RetryPolicy;

pub struct Publisher {
    items: Arc<dyn ItemStore>,
    api: Arc<dyn PublishApi>,
    credentials: Arc<dyn CredentialStore>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    enqueuer: Enqueuer,
    retry: RetryPolicy,
    publish_timeout: Duration,
}

impl Publisher {
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
            publish_timeout: engine.settings.publish_timeout,
        }
    }

    /// Publish an item this caller has claimed (status `publishing`).
    ///
    /// Missing credentials fail the item and surface as
    /// [`HeraldError::Configuration`]; every other failure is folded into the
    /// returned outcome.
    pub async fn publish(&self, item_id: ItemId, origin: Origin) -> Result<AttemptOutcome> {
        let item = self
            .items
            .get(item_id)
            .await?
            .ok_or(HeraldError::ItemNotFound(item_id))?;
        if item.status != ItemStatus::Publishing {
            return Err(HeraldError::InvalidTransition {
                id: item_id,
                from: item.status,
                to: ItemStatus::Published,
            });
        }

        let Some(credentials) = self.credentials.credentials_for(&item.owner_id).await? else {
            let message = format!("no publishing credentials for owner {}", item.owner_id);
            let error = ItemError::new(ErrorKind::Configuration, message.clone());
            self.items
                .mark_failed(item_id, item.attempts, &error, self.clock.now())
                .await?;
            self.record(item_id, origin, &AttemptOutcome::Failed { error })
                .await;
            error!(item_id = %item_id, %origin, "{message}");
            return Err(HeraldError::Configuration(message));
        };

        let request = PublishRequest::from(&item);
        let result = match tokio::time::timeout(
            self.publish_timeout,
            self.api.publish(&credentials, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::ambiguous(format!(
                "publish call did not finish within {:?}",
                self.publish_timeout
            ))),
        };

        let now = self.clock.now();
        let outcome = match result {
            Ok(external_id) => self.finalize(&item, external_id, now).await?,
            Err(err) => self.apply_failure(&item, &err, now).await?,
        };
        self.record(item_id, origin, &outcome).await;
        Ok(outcome)
    }

    async fn finalize(
        &self,
        item: &ScheduledItem,
        external_id: ExternalId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AttemptOutcome> {
        if !self.items.finalize_published(item.id, &external_id, now).await? {
            // The post exists remotely but the item left `publishing` under us.
            error!(item_id = %item.id, %external_id, "published but could not record external id");
            return Err(HeraldError::InvalidTransition {
                id: item.id,
                from: ItemStatus::Publishing,
                to: ItemStatus::Published,
            });
        }
        info!(item_id = %item.id, %external_id, "item published");
        Ok(AttemptOutcome::Published { external_id })
    }

    async fn apply_failure(
        &self,
        item: &ScheduledItem,
        err: &PublishError,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AttemptOutcome> {
        let error = ItemError::from(err);
        let attempts = item.attempts + 1;

        match err.kind {
            ErrorKind::Ambiguous => {
                self.items.flag_ambiguous(item.id, &error, now).await?;
                warn!(item_id = %item.id, %error, "publish outcome unknown; held for reconciliation");
                Ok(AttemptOutcome::Ambiguous { error })
            }
            ErrorKind::Transient if self.retry.allows_retry(attempts) => {
                let fire_at = after(now, self.retry.delay_for(attempts));
                if self
                    .items
                    .rearm(item.id, fire_at, attempts, Some(&error), now)
                    .await?
                {
                    self.enqueuer
                        .rearm(item.id, fire_at, Some(&error.to_string()))
                        .await?;
                }
                warn!(item_id = %item.id, attempts, %fire_at, %error, "publish failed; retry scheduled");
                Ok(AttemptOutcome::Retrying {
                    fire_at,
                    attempts,
                    error,
                })
            }
            _ => {
                self.items.mark_failed(item.id, attempts, &error, now).await?;
                warn!(item_id = %item.id, attempts, %error, "publish failed");
                Ok(AttemptOutcome::Failed { error })
            }
        }
    }

    /// Append to the activity log. Failures here never change the outcome.
    async fn record(&self, item_id: ItemId, origin: Origin, outcome: &AttemptOutcome) {
        let record = ActivityRecord::from_outcome(
            self.ids.generate_activity_id(),
            item_id,
            origin,
            outcome,
            self.clock.now(),
        );
        if let Err(e) = self.activity.append(record).await {
            warn!(item_id = %item_id, error = %e, "failed to append activity record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineSettings;
    use crate::domain::OwnerId;
    use crate::impls::{InMemoryActivityLog, InMemoryItemStore, ScriptedPublishApi, StaticCredentials, Step};
    use crate::ports::{Credentials, DelayQueue, FixedClock};
    use crate::queue::InMemoryDelayQueue;
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        engine: PublicationEngine,
        items: InMemoryItemStore,
        queue: InMemoryDelayQueue,
        activity: InMemoryActivityLog,
        api: ScriptedPublishApi,
    }

    fn fixture(api: ScriptedPublishApi, credentials: StaticCredentials) -> Fixture {
        let items = InMemoryItemStore::new();
        let queue = InMemoryDelayQueue::new();
        let activity = InMemoryActivityLog::new();
        let settings = EngineSettings {
            publish_timeout: Duration::from_millis(200),
            ..EngineSettings::default()
        };
        let engine = PublicationEngine::builder()
            .items(items.clone())
            .queue(queue.clone())
            .publish_api(api.clone())
            .credentials(credentials)
            .activity(activity.clone())
            .clock(FixedClock::new(t0()))
            .settings(settings)
            .build()
            .unwrap();
        Fixture {
            engine,
            items,
            queue,
            activity,
            api,
        }
    }

    async fn claimed_item(f: &Fixture) -> ItemId {
        let item = f.engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        f.items.set_schedule(item.id, t0(), t0()).await.unwrap();
        assert!(f.engine.claim_guard().claim(item.id).await.unwrap());
        item.id
    }

    fn shared() -> StaticCredentials {
        StaticCredentials::shared(Credentials::new("token"))
    }

    #[tokio::test]
    async fn success_records_external_id() {
        let f = fixture(ScriptedPublishApi::new(), shared());
        let id = claimed_item(&f).await;

        let outcome = f.engine.publisher().publish(id, Origin::Manual).await.unwrap();
        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Published);
        assert_eq!(
            outcome,
            AttemptOutcome::Published {
                external_id: item.external_id.clone().unwrap()
            }
        );
        assert_eq!(f.activity.all().len(), 1);
        assert_eq!(f.activity.all()[0].outcome, "published");
    }

    #[tokio::test]
    async fn transient_failure_rearms_with_backoff() {
        let f = fixture(
            ScriptedPublishApi::failing(1, PublishError::transient("503")),
            shared(),
        );
        let id = claimed_item(&f).await;

        let outcome = f.engine.publisher().publish(id, Origin::Manual).await.unwrap();
        let expected_at = t0() + chrono::Duration::seconds(4);
        assert!(matches!(
            outcome,
            AttemptOutcome::Retrying { fire_at, attempts: 1, .. } if fire_at == expected_at
        ));

        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Scheduled);
        assert_eq!(item.scheduled_for, Some(expected_at));
        let job = f.queue.live_job_for(id).await.unwrap().unwrap();
        assert_eq!(job.fire_at, expected_at);
    }

    #[rstest]
    #[case::authorization(PublishError::authorization("token revoked"))]
    #[case::permanent(PublishError::permanent("content rejected"))]
    #[tokio::test]
    async fn non_retryable_failures_fail_the_item(#[case] err: PublishError) {
        let kind = err.kind;
        let f = fixture(ScriptedPublishApi::failing(1, err), shared());
        let id = claimed_item(&f).await;

        let outcome = f.engine.publisher().publish(id, Origin::Manual).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Failed { ref error } if error.kind == kind));

        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.external_id.is_none());
        assert!(f.queue.live_job_for(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timeout_is_ambiguous_and_not_retried() {
        let f = fixture(
            ScriptedPublishApi::with_steps([Step::Stall(Duration::from_secs(5))]),
            shared(),
        );
        let id = claimed_item(&f).await;

        let outcome = f.engine.publisher().publish(id, Origin::Manual).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Ambiguous { .. }));

        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Publishing);
        assert!(item.is_ambiguous());
        assert!(f.queue.live_job_for(id).await.unwrap().is_none());
        assert_eq!(f.api.calls(), 1);
    }

    #[tokio::test]
    async fn missing_credentials_is_a_configuration_error() {
        let f = fixture(ScriptedPublishApi::new(), StaticCredentials::new());
        let id = claimed_item(&f).await;

        let err = f.engine.publisher().publish(id, Origin::Manual).await.unwrap_err();
        assert!(matches!(err, HeraldError::Configuration(_)));

        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.last_error.unwrap().kind, ErrorKind::Configuration);
        assert_eq!(f.api.calls(), 0);
    }

    #[tokio::test]
    async fn unclaimed_item_is_refused() {
        let f = fixture(ScriptedPublishApi::new(), shared());
        let item = f.engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();

        let err = f.engine.publisher().publish(item.id, Origin::Manual).await.unwrap_err();
        assert!(matches!(err, HeraldError::InvalidTransition { from: ItemStatus::Draft, .. }));
        assert_eq!(f.api.calls(), 0);
    }
}
