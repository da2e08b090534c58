#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use herald_core::app::EngineSettings;
use herald_core::config::Environment;
use herald_core::domain::{ItemId, OwnerId};
use herald_core::impls::{InMemoryActivityLog, InMemoryItemStore, ScriptedPublishApi, StaticCredentials};
use herald_core::ports::{Clock, Credentials, FixedClock};
use herald_core::queue::InMemoryDelayQueue;
use herald_core::PublicationEngine;

pub const SECRET: &str = "trigger-secret";
pub const OPERATOR: &str = "operator-token";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        environment: Environment::Development,
        trigger_secret: Some(SECRET.to_string()),
        operator_token: Some(OPERATOR.to_string()),
        ..EngineSettings::default()
    }
}

/// An in-memory engine on a pinned clock.
pub struct Harness {
    pub engine: PublicationEngine,
    pub clock: FixedClock,
    pub api: ScriptedPublishApi,
    pub queue: InMemoryDelayQueue,
    pub items: InMemoryItemStore,
}

impl Harness {
    pub fn new(api: ScriptedPublishApi) -> Self {
        Self::with_settings(api, settings())
    }

    pub fn with_settings(api: ScriptedPublishApi, settings: EngineSettings) -> Self {
        let clock = FixedClock::new(t0());
        let queue = InMemoryDelayQueue::new();
        let items = InMemoryItemStore::new();
        let engine = PublicationEngine::builder()
            .items(items.clone())
            .queue(queue.clone())
            .publish_api(api.clone())
            .credentials(StaticCredentials::shared(Credentials::new("token")))
            .activity(InMemoryActivityLog::new())
            .clock(clock.clone())
            .settings(settings)
            .build()
            .unwrap();
        Self {
            engine,
            clock,
            api,
            queue,
            items,
        }
    }

    /// Create a draft for `owner` and schedule it `secs` from now.
    pub async fn scheduled(&self, owner: &str, secs: i64) -> ItemId {
        let item = self
            .engine
            .create_draft(OwnerId::new(owner), "scheduled post")
            .await
            .unwrap();
        self.engine
            .schedule_item(item.id, self.clock.now() + chrono::Duration::seconds(secs))
            .await
            .unwrap();
        item.id
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}
