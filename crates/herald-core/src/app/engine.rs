//! PublicationEngine - wiring of the ports plus the shared publish path.
//!
//! Every trigger (queue sweep, periodic scan, client check, "publish now")
//! ends in [`PublicationEngine::attempt_publish`]: claim, and only if the claim
//! wins, publish.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::claim::ClaimGuard;
use super::consumer::QueueConsumer;
use super::enqueuer::Enqueuer;
use super::introspection::Introspection;
use super::publisher::Publisher;
use super::reconciler::Reconciler;
use super::scanner::FallbackScanner;
use super::triggers::TriggerGateway;
use crate::config::Environment;
use crate::domain::{
    ActivityRecord, AttemptOutcome, ItemId, ItemStatus, JobId, Origin, OwnerId, ScheduledItem,
};
use crate::error::{HeraldError, Result};
use crate::ports::{
    ActivityLog, Clock, CredentialStore, DelayQueue, IdGenerator, ItemStore, PublishApi,
    SystemClock, UlidGenerator,
};
use crate::queue::RetryPolicy;

/// Tunables shared by every component.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retry: RetryPolicy,
    /// Upper bound on items/jobs handled per sweep.
    pub batch_size: usize,
    /// Bound on one external publish call.
    pub publish_timeout: Duration,
    /// A claim older than this is presumed abandoned by a crashed publisher.
    pub stale_claim_after: Duration,
    pub max_page_size: usize,
    pub environment: Environment,
    pub trigger_secret: Option<String>,
    pub operator_token: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_size: 50,
            publish_timeout: Duration::from_secs(15),
            stale_claim_after: Duration::from_secs(300),
            max_page_size: 100,
            environment: Environment::Production,
            trigger_secret: None,
            operator_token: None,
        }
    }
}

/// BuildError - a required port was never supplied.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing ports: {0:?}")]
    MissingPorts(Vec<&'static str>),
}

/// Builds a [`PublicationEngine`], failing fast when a port is missing.
///
/// ```ignore
/// let engine = EngineBuilder::new()
///     .items(db.item_store())
///     .queue(db.delay_queue())
///     .activity(db.activity_log())
///     .publish_api(api)
///     .credentials(creds)
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    items: Option<Arc<dyn ItemStore>>,
    queue: Option<Arc<dyn DelayQueue>>,
    api: Option<Arc<dyn PublishApi>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    activity: Option<Arc<dyn ActivityLog>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    settings: EngineSettings,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(mut self, items: impl ItemStore + 'static) -> Self {
        self.items = Some(Arc::new(items));
        self
    }

    pub fn queue(mut self, queue: impl DelayQueue + 'static) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    pub fn publish_api(mut self, api: impl PublishApi + 'static) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    pub fn credentials(mut self, credentials: impl CredentialStore + 'static) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    pub fn activity(mut self, activity: impl ActivityLog + 'static) -> Self {
        self.activity = Some(Arc::new(activity));
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Defaults to ULIDs stamped by the engine clock.
    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> std::result::Result<PublicationEngine, BuildError> {
        let mut missing = Vec::new();
        if self.items.is_none() {
            missing.push("items");
        }
        if self.queue.is_none() {
            missing.push("queue");
        }
        if self.api.is_none() {
            missing.push("publish_api");
        }
        if self.credentials.is_none() {
            missing.push("credentials");
        }
        if self.activity.is_none() {
            missing.push("activity");
        }
        let (Some(items), Some(queue), Some(api), Some(credentials), Some(activity)) =
            (self.items, self.queue, self.api, self.credentials, self.activity)
        else {
            return Err(BuildError::MissingPorts(missing));
        };

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(PublicationEngine {
            items,
            queue,
            api,
            credentials,
            activity,
            clock,
            ids,
            settings: Arc::new(self.settings),
        })
    }
}

/// Cheap to clone; every clone shares the same ports.
#[derive(Clone)]
pub struct PublicationEngine {
    pub(crate) items: Arc<dyn ItemStore>,
    pub(crate) queue: Arc<dyn DelayQueue>,
    pub(crate) api: Arc<dyn PublishApi>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) activity: Arc<dyn ActivityLog>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) settings: Arc<EngineSettings>,
}

impl PublicationEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn enqueuer(&self) -> Enqueuer {
        Enqueuer::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        )
    }

    pub fn claim_guard(&self) -> ClaimGuard {
        ClaimGuard::new(Arc::clone(&self.items), Arc::clone(&self.clock))
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self)
    }

    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer::new(self.clone())
    }

    pub fn scanner(&self) -> FallbackScanner {
        FallbackScanner::new(self.clone())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self)
    }

    pub fn introspection(&self) -> Introspection {
        Introspection::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.clock),
            Arc::clone(&self.settings),
        )
    }

    pub fn triggers(&self) -> TriggerGateway {
        TriggerGateway::new(self.clone())
    }

    /// The shared claim -> publish path.
    ///
    /// Losing the claim is a normal outcome ([`AttemptOutcome::ClaimLost`]),
    /// not an error.
    pub async fn attempt_publish(&self, item_id: ItemId, origin: Origin) -> Result<AttemptOutcome> {
        if !self.claim_guard().claim(item_id).await? {
            debug!(item_id = %item_id, %origin, "claim lost; skipping");
            return Ok(AttemptOutcome::ClaimLost);
        }
        self.publisher().publish(item_id, origin).await
    }

    /// Create a new `draft` item.
    pub async fn create_draft(
        &self,
        owner_id: OwnerId,
        content: impl Into<String>,
    ) -> Result<ScheduledItem> {
        let item = ScheduledItem::draft(
            self.ids.generate_item_id(),
            owner_id,
            content,
            self.clock.now(),
        );
        self.items.insert(item.clone()).await?;
        info!(item_id = %item.id, owner_id = %item.owner_id, "draft created");
        Ok(item)
    }

    pub async fn item(&self, item_id: ItemId) -> Result<ScheduledItem> {
        self.items
            .get(item_id)
            .await?
            .ok_or(HeraldError::ItemNotFound(item_id))
    }

    /// Schedule (or reschedule) an item and replace its delay-queue job.
    pub async fn schedule_item(
        &self,
        item_id: ItemId,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<JobId> {
        let now = self.clock.now();
        if at <= now {
            return Err(HeraldError::InvalidSchedule(format!(
                "fire time {at} is not after now ({now})"
            )));
        }
        if !self.items.set_schedule(item_id, at, now).await? {
            let item = self.item(item_id).await?;
            return Err(HeraldError::ItemBusy {
                id: item_id,
                status: item.status,
            });
        }
        self.enqueuer().schedule(item_id, at).await
    }

    /// Move a scheduled item back to `draft` and retract its job.
    ///
    /// Fails with [`HeraldError::ItemBusy`] once a claim has won.
    pub async fn withdraw_item(&self, item_id: ItemId) -> Result<usize> {
        let now = self.clock.now();
        if !self.items.unschedule(item_id, now).await? {
            let item = self.item(item_id).await?;
            if matches!(item.status, ItemStatus::Publishing | ItemStatus::Published) {
                return Err(HeraldError::ItemBusy {
                    id: item_id,
                    status: item.status,
                });
            }
        }
        let removed = self.enqueuer().cancel(item_id).await?;
        info!(item_id = %item_id, removed, "item withdrawn");
        Ok(removed)
    }

    pub async fn activity_for(&self, item_id: ItemId) -> Result<Vec<ActivityRecord>> {
        self.activity.for_item(item_id).await
    }

    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.activity.recent(limit).await
    }
}
