//! Trigger gateway - the authenticated entry points that start sweeps.
//!
//! Schedulers present the shared trigger secret; signed-in clients present a
//! [`Session`] and may only touch their own items.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::PublicationEngine;
use super::scanner::ScanScope;
use crate::domain::{AttemptOutcome, ItemId, Origin, OwnerId, SweepReport};
use crate::error::{HeraldError, Result};

/// An authenticated client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub owner_id: OwnerId,
}

impl Session {
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }
}

/// What one periodic trigger did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicReport {
    pub scan: SweepReport,
    pub reconcile: SweepReport,
}

pub struct TriggerGateway {
    engine: PublicationEngine,
}

impl TriggerGateway {
    pub fn new(engine: PublicationEngine) -> Self {
        Self { engine }
    }

    fn check_secret(&self, presented: &str) -> Result<()> {
        let Some(expected) = self.engine.settings.trigger_secret.as_deref() else {
            return Err(HeraldError::Configuration(
                "no trigger secret configured".to_string(),
            ));
        };
        if presented != expected {
            warn!("rejected trigger secret");
            return Err(HeraldError::Unauthorized("invalid trigger secret".to_string()));
        }
        Ok(())
    }

    /// Periodic trigger: fallback scan over every owner, then reconciliation.
    pub async fn periodic(&self, secret: &str) -> Result<PeriodicReport> {
        self.check_secret(secret)?;
        let scan = self.engine.scanner().sweep(ScanScope::All).await?;
        let reconcile = self.engine.reconciler().sweep().await?;
        Ok(PeriodicReport { scan, reconcile })
    }

    /// Delay-queue consumer sweep.
    pub async fn queue_sweep(&self, secret: &str) -> Result<SweepReport> {
        self.check_secret(secret)?;
        self.engine.consumer().sweep().await
    }

    /// A client checking its own due items, e.g. on page load.
    pub async fn client_check(&self, session: &Session) -> Result<SweepReport> {
        self.engine
            .scanner()
            .sweep(ScanScope::Owner(session.owner_id.clone()))
            .await
    }

    /// Publish one of the caller's items immediately.
    pub async fn publish_now(&self, session: &Session, item_id: ItemId) -> Result<AttemptOutcome> {
        let item = self.engine.item(item_id).await?;
        if item.owner_id != session.owner_id {
            warn!(item_id = %item_id, owner_id = %session.owner_id, "publish_now on foreign item");
            return Err(HeraldError::Unauthorized(format!(
                "item {item_id} does not belong to {}",
                session.owner_id
            )));
        }

        let now = self.engine.clock.now();
        if !self.engine.items.set_schedule(item_id, now, now).await? {
            let item = self.engine.item(item_id).await?;
            return Err(HeraldError::ItemBusy {
                id: item_id,
                status: item.status,
            });
        }
        // The job for the old fire time is superseded.
        self.engine.enqueuer().cancel(item_id).await?;
        info!(item_id = %item_id, owner_id = %session.owner_id, "publish requested now");
        self.engine.attempt_publish(item_id, Origin::Manual).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EngineSettings;
    use crate::domain::{ItemStatus, JobState, PublishError};
    use crate::impls::{InMemoryActivityLog, InMemoryItemStore, ScriptedPublishApi, StaticCredentials};
    use crate::ports::{Credentials, DelayQueue, FixedClock};
    use crate::queue::InMemoryDelayQueue;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn gateway(
        api: ScriptedPublishApi,
        secret: Option<&str>,
    ) -> (PublicationEngine, FixedClock, InMemoryDelayQueue) {
        let clock = FixedClock::new(t0());
        let queue = InMemoryDelayQueue::new();
        let settings = EngineSettings {
            trigger_secret: secret.map(str::to_string),
            ..EngineSettings::default()
        };
        let engine = PublicationEngine::builder()
            .items(InMemoryItemStore::new())
            .queue(queue.clone())
            .publish_api(api)
            .credentials(StaticCredentials::shared(Credentials::new("t")))
            .activity(InMemoryActivityLog::new())
            .clock(clock.clone())
            .settings(settings)
            .build()
            .unwrap();
        (engine, clock, queue)
    }

    #[tokio::test]
    async fn triggers_require_the_secret() {
        let (engine, _, _) = gateway(ScriptedPublishApi::new(), Some("s3cret"));
        let triggers = engine.triggers();

        assert!(matches!(
            triggers.periodic("wrong").await,
            Err(HeraldError::Unauthorized(_))
        ));
        assert!(matches!(
            triggers.queue_sweep("").await,
            Err(HeraldError::Unauthorized(_))
        ));
        assert!(triggers.queue_sweep("s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn missing_secret_is_a_configuration_error() {
        let (engine, _, _) = gateway(ScriptedPublishApi::new(), None);
        assert!(matches!(
            engine.triggers().periodic("anything").await,
            Err(HeraldError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn periodic_scans_then_reconciles() {
        let api = ScriptedPublishApi::new();
        let (engine, clock, _) = gateway(api.clone(), Some("s3cret"));
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let report = engine.triggers().periodic("s3cret").await.unwrap();
        assert_eq!(report.scan.origin, Origin::PeriodicScan);
        assert_eq!(report.scan.published, 1);
        assert_eq!(report.reconcile.origin, Origin::Reconciler);
        assert_eq!(report.reconcile.processed(), 0);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn publish_now_publishes_a_draft_immediately() {
        let api = ScriptedPublishApi::new();
        let (engine, _, queue) = gateway(api.clone(), Some("s3cret"));
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        let session = Session::new(OwnerId::new("u1"));

        let outcome = engine.triggers().publish_now(&session, item.id).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Published { .. }));
        assert_eq!(engine.item(item.id).await.unwrap().status, ItemStatus::Published);
        assert_eq!(queue.counts(t0()).await.unwrap().get(JobState::Delayed), 0);
    }

    #[tokio::test]
    async fn publish_now_rejects_foreign_items() {
        let api = ScriptedPublishApi::new();
        let (engine, _, _) = gateway(api.clone(), Some("s3cret"));
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        let intruder = Session::new(OwnerId::new("u2"));

        let err = engine.triggers().publish_now(&intruder, item.id).await.unwrap_err();
        assert!(matches!(err, HeraldError::Unauthorized(_)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn publish_now_on_a_published_item_is_busy() {
        let (engine, _, _) = gateway(ScriptedPublishApi::new(), Some("s3cret"));
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        let session = Session::new(OwnerId::new("u1"));
        engine.triggers().publish_now(&session, item.id).await.unwrap();

        let err = engine.triggers().publish_now(&session, item.id).await.unwrap_err();
        assert!(matches!(
            err,
            HeraldError::ItemBusy { status: ItemStatus::Published, .. }
        ));
    }

    #[tokio::test]
    async fn client_check_reports_retries() {
        let (engine, clock, _) = gateway(
            ScriptedPublishApi::failing(1, PublishError::transient("503")),
            Some("s3cret"),
        );
        let item = engine.create_draft(OwnerId::new("u1"), "hi").await.unwrap();
        engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let report = engine
            .triggers()
            .client_check(&Session::new(OwnerId::new("u1")))
            .await
            .unwrap();
        assert_eq!(report.origin, Origin::ClientCheck);
        assert_eq!(report.retried, 1);
    }
}
