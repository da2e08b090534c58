//! The engine on the SQLite stores, including across reopen.

mod common;

use common::{settings, t0, SECRET};
use herald_core::domain::{AttemptOutcome, ItemStatus, JobState, Origin, OwnerId, PublishError};
use herald_core::impls::{ScriptedPublishApi, SqliteDatabase, StaticCredentials};
use herald_core::ports::{Credentials, FixedClock};
use herald_core::PublicationEngine;
use std::time::Duration;

fn engine(db: &SqliteDatabase, api: ScriptedPublishApi, clock: FixedClock) -> PublicationEngine {
    PublicationEngine::builder()
        .items(db.item_store())
        .queue(db.delay_queue())
        .activity(db.activity_log())
        .publish_api(api)
        .credentials(StaticCredentials::shared(Credentials::new("token")))
        .clock(clock)
        .settings(settings())
        .build()
        .unwrap()
}

#[tokio::test]
async fn schedule_survives_reopen_and_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.db");
    let clock = FixedClock::new(t0());

    let item_id = {
        let db = SqliteDatabase::open(&path).unwrap();
        let engine = engine(&db, ScriptedPublishApi::new(), clock.clone());
        let item = engine.create_draft(OwnerId::new("u1"), "hello").await.unwrap();
        engine
            .schedule_item(item.id, t0() + chrono::Duration::seconds(60))
            .await
            .unwrap();
        item.id
    };

    clock.advance(Duration::from_secs(60));
    let db = SqliteDatabase::open(&path).unwrap();
    let api = ScriptedPublishApi::new();
    let engine = engine(&db, api.clone(), clock.clone());

    let report = engine.triggers().queue_sweep(SECRET).await.unwrap();
    assert_eq!(report.published, 1);
    let item = engine.item(item_id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Published);
    assert!(item.external_id.is_some());

    let introspection = engine.introspection();
    let op = introspection.authorize(common::OPERATOR).unwrap();
    let stats = introspection.stats(&op).await.unwrap();
    assert_eq!(stats.counts.get(JobState::Completed), 1);
    assert_eq!(stats.counts.live(), 0);
    assert_eq!(engine.activity_for(item_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn retry_and_reconcile_on_sqlite() {
    let db = SqliteDatabase::open_in_memory().unwrap();
    let clock = FixedClock::new(t0());
    let api = ScriptedPublishApi::failing(1, PublishError::transient("503"));
    api.push_steps([herald_core::impls::Step::Fail(PublishError::ambiguous(
        "connection reset",
    ))]);
    let engine = engine(&db, api.clone(), clock.clone());

    let item = engine.create_draft(OwnerId::new("u1"), "hello").await.unwrap();
    engine
        .schedule_item(item.id, t0() + chrono::Duration::seconds(10))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10));
    assert_eq!(engine.triggers().queue_sweep(SECRET).await.unwrap().retried, 1);

    clock.advance(Duration::from_secs(4));
    assert_eq!(engine.triggers().queue_sweep(SECRET).await.unwrap().ambiguous, 1);
    assert!(engine.item(item.id).await.unwrap().is_ambiguous());

    let tick = engine.triggers().periodic(SECRET).await.unwrap();
    assert_eq!(tick.reconcile.retried, 1);
    assert_eq!(engine.item(item.id).await.unwrap().attempts, 2);

    // Backoff after the second attempt.
    assert_eq!(engine.triggers().queue_sweep(SECRET).await.unwrap().processed(), 0);
    clock.advance(Duration::from_secs(8));
    assert_eq!(engine.triggers().queue_sweep(SECRET).await.unwrap().published, 1);
    assert_eq!(api.calls(), 3);
    assert_eq!(engine.item(item.id).await.unwrap().status, ItemStatus::Published);
}

#[tokio::test]
async fn pause_persists_in_the_database() {
    let db = SqliteDatabase::open_in_memory().unwrap();
    let clock = FixedClock::new(t0());
    let engine = engine(&db, ScriptedPublishApi::new(), clock.clone());
    let op = engine.introspection().authorize(common::OPERATOR).unwrap();
    engine.introspection().pause(&op).await.unwrap();

    let item = engine.create_draft(OwnerId::new("u1"), "hello").await.unwrap();
    engine
        .schedule_item(item.id, t0() + chrono::Duration::seconds(10))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(10));

    let report = engine.triggers().queue_sweep(SECRET).await.unwrap();
    assert!(report.paused);
    assert_eq!(engine.item(item.id).await.unwrap().status, ItemStatus::Scheduled);

    // The fallback scan ignores the pause.
    let tick = engine.triggers().periodic(SECRET).await.unwrap();
    assert_eq!(tick.scan.published, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_handles_on_one_file_claim_each_item_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.db");
    let clock = FixedClock::new(t0());

    // Two processes sharing the database file.
    let first_db = SqliteDatabase::open(&path).unwrap();
    let second_db = SqliteDatabase::open(&path).unwrap();
    let first_api = ScriptedPublishApi::new().with_latency(Duration::from_millis(5));
    let second_api = ScriptedPublishApi::new().with_latency(Duration::from_millis(5));
    let first = engine(&first_db, first_api.clone(), clock.clone());
    let second = engine(&second_db, second_api.clone(), clock.clone());

    let mut ids = Vec::new();
    for _ in 0..20 {
        let item = first.create_draft(OwnerId::new("u1"), "hello").await.unwrap();
        first
            .schedule_item(item.id, t0() + chrono::Duration::seconds(10))
            .await
            .unwrap();
        ids.push(item.id);
    }
    clock.advance(Duration::from_secs(10));

    let mut handles = Vec::new();
    for &id in &ids {
        for engine in [first.clone(), second.clone()] {
            handles.push(tokio::spawn(async move {
                engine.attempt_publish(id, Origin::Manual).await.unwrap()
            }));
        }
    }
    let mut published = 0;
    for handle in handles {
        match handle.await.unwrap() {
            AttemptOutcome::Published { .. } => published += 1,
            AttemptOutcome::ClaimLost => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(published, ids.len());
    assert_eq!(first_api.calls() + second_api.calls(), ids.len());
    for id in ids {
        assert_eq!(second.item(id).await.unwrap().status, ItemStatus::Published);
    }
}
