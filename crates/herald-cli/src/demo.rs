//! `herald demo` - walk a few items through every path on an in-memory engine
//! with a pinned clock, printing each sweep report.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use herald_core::app::{EngineSettings, Session};
use herald_core::config::Environment;
use herald_core::domain::{OwnerId, PublishError};
use herald_core::impls::{
    InMemoryActivityLog, InMemoryItemStore, ScriptedPublishApi, StaticCredentials, Step,
};
use herald_core::ports::{Clock, Credentials, FixedClock};
use herald_core::queue::InMemoryDelayQueue;
use herald_core::PublicationEngine;

const SECRET: &str = "demo-secret";
const OPERATOR: &str = "demo-operator";

pub async fn run() -> Result<()> {
    let clock = FixedClock::new(Utc::now());
    // First call succeeds, second hits a 503, third ends ambiguously.
    let api = ScriptedPublishApi::with_steps([
        Step::Succeed,
        Step::Fail(PublishError::transient("503 service unavailable")),
        Step::Fail(PublishError::ambiguous("connection reset after send")),
    ]);
    let engine = PublicationEngine::builder()
        .items(InMemoryItemStore::new())
        .queue(InMemoryDelayQueue::new())
        .publish_api(api.clone())
        .credentials(StaticCredentials::shared(Credentials::new("demo-token")))
        .activity(InMemoryActivityLog::new())
        .clock(clock.clone())
        .settings(EngineSettings {
            environment: Environment::Development,
            trigger_secret: Some(SECRET.to_string()),
            operator_token: Some(OPERATOR.to_string()),
            ..EngineSettings::default()
        })
        .build()?;

    let alice = OwnerId::new("alice");
    let bob = OwnerId::new("bob");
    let mut ids = Vec::new();
    for (owner, content) in [
        (&alice, "launch announcement"),
        (&alice, "weekly digest"),
        (&bob, "release notes"),
    ] {
        let item = engine.create_draft(owner.clone(), content).await?;
        engine
            .schedule_item(item.id, clock.now() + chrono::Duration::seconds(60))
            .await?;
        ids.push(item.id);
    }

    clock.advance(Duration::from_secs(60));
    let sweep = engine.triggers().queue_sweep(SECRET).await?;
    println!("queue sweep: {}", serde_json::to_string(&sweep)?);

    // A client check racing the sweep finds nothing left to claim.
    let check = engine
        .triggers()
        .client_check(&Session::new(alice.clone()))
        .await?;
    println!("client check: {}", serde_json::to_string(&check)?);

    // Retry backoff elapses; the ambiguous claim goes stale.
    clock.advance(Duration::from_secs(301));
    let tick = engine.triggers().periodic(SECRET).await?;
    println!("periodic: {}", serde_json::to_string(&tick)?);

    // The re-armed item waits out its first backoff.
    clock.advance(Duration::from_secs(4));
    let sweep = engine.triggers().queue_sweep(SECRET).await?;
    println!("queue sweep: {}", serde_json::to_string(&sweep)?);

    for id in ids {
        let item = engine.item(id).await?;
        println!(
            "{} [{}] {} -> {:?}",
            item.id,
            item.owner_id,
            item.status,
            item.external_id.map(|e| e.to_string())
        );
    }
    let introspection = engine.introspection();
    let operator = introspection.authorize(OPERATOR)?;
    println!(
        "stats: {}",
        serde_json::to_string(&introspection.stats(&operator).await?)?
    );
    info!(calls = api.calls(), "demo finished");
    Ok(())
}
