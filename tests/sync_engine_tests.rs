// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the trophy sync engine.

mod common;

use chrono::{Duration, Utc};
use common::{earned, fast_settings, seed_user, FakeFetch, FlakyStore, TestPipeline};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use trophy_tracker::config::DataSourceMode;
use trophy_tracker::db::{InMemoryStore, TrackerStore};
use trophy_tracker::models::{TrophyRank, User};
use trophy_tracker::services::kms::seal_tokens;
use trophy_tracker::services::{SkipReason, SyncSettings, UserSyncOutcome};

fn memory_pipeline() -> (InMemoryStore, TestPipeline) {
    let store = InMemoryStore::new();
    let pipeline = TestPipeline::new(Arc::new(store.clone()));
    (store, pipeline)
}

#[tokio::test]
async fn test_only_trophies_after_watermark_are_recorded() {
    let (store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    let user = seed_user(&*p.store, &p.kms, "u1", t0).await;

    p.api.respond(
        "acc-u1",
        FakeFetch::Trophies(vec![
            earned(1, TrophyRank::Bronze, "NPWR1", t0 + Duration::seconds(10)),
            earned(2, TrophyRank::Platinum, "NPWR1", t0 - Duration::seconds(5)),
        ]),
    );

    let before = Utc::now();
    let outcome = p.engine.sync_one(&user).await.unwrap();

    // Only R1 is stored
    let stored = store.trophies_for("u1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].trophy_id, 1);
    assert!(stored[0].notified);

    // R1 goes out in a batched summary, R2 is never announced
    let titles = p.resolver.sent_titles();
    assert_eq!(titles.len(), 1);
    assert!(titles[0].contains("1 new trophy"));
    assert!(!titles.iter().any(|t| t.contains("Platinum")));

    match outcome {
        UserSyncOutcome::Checked {
            fetched,
            new_trophies,
            notifications,
        } => {
            assert_eq!(fetched, 2);
            assert_eq!(new_trophies, 1);
            assert_eq!(notifications.unwrap().delivered, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert!(p.watermark("u1").await >= before - Duration::seconds(1));
}

#[tokio::test]
async fn test_expired_token_without_refresh_skips_fetch() {
    let (_store, p) = memory_pipeline();

    let mut user = User::new("u1", "acc-u1");
    user.tokens = Some(
        seal_tokens(
            &p.kms,
            "u1",
            "stale-access",
            None,
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap(),
    );
    p.store.upsert_user(&user).await.unwrap();

    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert_eq!(outcome, UserSyncOutcome::Skipped(SkipReason::NoCredential));
    assert!(p.api.fetch_calls().is_empty());
    assert_eq!(p.api.refresh_calls(), 0);
}

#[tokio::test]
async fn test_user_without_account_is_skipped() {
    let (_store, p) = memory_pipeline();

    let mut user = User::new("u1", "acc-u1");
    user.account_id = None;
    p.store.upsert_user(&user).await.unwrap();

    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert_eq!(outcome, UserSyncOutcome::Skipped(SkipReason::NotLinked));
    assert!(p.api.fetch_calls().is_empty());
}

#[tokio::test]
async fn test_one_failing_user_does_not_stop_the_run() {
    let (store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);

    for id in ["u1", "u2", "u3"] {
        seed_user(&*p.store, &p.kms, id, t0).await;
        p.api.respond(
            &format!("acc-{}", id),
            FakeFetch::Trophies(vec![earned(
                1,
                TrophyRank::Gold,
                "NPWR1",
                t0 + Duration::minutes(1),
            )]),
        );
    }
    p.api
        .respond("acc-u2", FakeFetch::Fail("connection reset".to_string()));

    let report = p.engine.sync_all().await;

    assert_eq!(report.candidates, 3);
    assert_eq!(report.checked, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.new_trophies, 2);

    assert_eq!(store.trophies_for("u1").len(), 1);
    assert!(store.trophies_for("u2").is_empty());
    assert_eq!(store.trophies_for("u3").len(), 1);

    // Every watermark advances, including the user whose fetch failed
    for id in ["u1", "u2", "u3"] {
        assert!(p.watermark(id).await > t0);
    }
}

#[tokio::test]
async fn test_refetched_trophy_is_stored_once() {
    let (store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    let user = seed_user(&*p.store, &p.kms, "u1", t0).await;

    p.api.respond(
        "acc-u1",
        FakeFetch::Trophies(vec![earned(
            1,
            TrophyRank::Silver,
            "NPWR1",
            t0 + Duration::minutes(5),
        )]),
    );

    p.engine.sync_one(&user).await.unwrap();

    // Roll the watermark back so the same trophy qualifies again
    p.store.set_last_checked("u1", t0).await.unwrap();
    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert!(matches!(
        outcome,
        UserSyncOutcome::Checked {
            new_trophies: 0,
            notifications: None,
            ..
        }
    ));
    assert_eq!(store.trophies_for("u1").len(), 1);
    assert_eq!(p.resolver.sent().len(), 1);
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let (_store, p) = memory_pipeline();
    let future = Utc::now() + Duration::days(1);
    let user = seed_user(&*p.store, &p.kms, "u1", future).await;

    p.engine.sync_one(&user).await.unwrap();
    assert_eq!(p.watermark("u1").await, future);

    let mut previous = p.watermark("u1").await;
    for _ in 0..3 {
        p.engine.sync_one(&user).await.unwrap();
        let current = p.watermark("u1").await;
        assert!(current >= previous);
        previous = current;
    }
}

#[tokio::test]
async fn test_fetch_timeout_still_advances_watermark() {
    let (store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    let user = seed_user(&*p.store, &p.kms, "u1", t0).await;
    p.api.respond("acc-u1", FakeFetch::Hang);

    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert_eq!(
        outcome,
        UserSyncOutcome::Checked {
            fetched: 0,
            new_trophies: 0,
            notifications: None,
        }
    );
    assert!(store.trophies_for("u1").is_empty());
    assert!(p.watermark("u1").await > t0);
}

#[tokio::test]
async fn test_store_failure_keeps_watermark() {
    let store = FlakyStore::default();
    let p = TestPipeline::new(Arc::new(store.clone()));
    let t0 = Utc::now() - Duration::hours(1);
    let user = seed_user(&*p.store, &p.kms, "u1", t0).await;

    p.api.respond(
        "acc-u1",
        FakeFetch::Trophies(vec![earned(
            1,
            TrophyRank::Bronze,
            "NPWR1",
            t0 + Duration::minutes(1),
        )]),
    );
    store.fail_inserts(true);

    assert!(p.engine.sync_one(&user).await.is_err());
    assert_eq!(p.watermark("u1").await, t0);

    // sync_all counts it as a failure and keeps going
    let report = p.engine.sync_all().await;
    assert_eq!(report.failed, 1);
    assert!(p.resolver.sent().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_do_not_overlap() {
    let (_store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    seed_user(&*p.store, &p.kms, "u1", t0).await;
    seed_user(&*p.store, &p.kms, "u2", t0).await;
    p.api.set_fetch_delay(std::time::Duration::from_millis(50));

    let (first, second) = tokio::join!(p.engine.sync_all(), p.engine.sync_all());

    assert!(!first.already_running);
    assert_eq!(first.checked, 2);
    assert!(second.already_running);
    assert_eq!(second.checked, 0);

    // Exactly one fetch per user
    assert_eq!(p.api.fetch_calls().len(), 2);
    assert!(!p.engine.is_running());
}

#[tokio::test]
async fn test_public_mode_uses_shared_token() {
    let store = InMemoryStore::new();
    let settings = trophy_tracker::services::SyncSettings {
        mode: DataSourceMode::Public,
        public_token: Some("public-token".to_string()),
        ..fast_settings()
    };
    let p = TestPipeline::with_settings(Arc::new(store), settings);

    let user = User::new("u1", "acc-u1");
    p.store.upsert_user(&user).await.unwrap();

    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert!(matches!(outcome, UserSyncOutcome::Checked { .. }));
    assert_eq!(
        p.api.fetch_calls(),
        vec![("public-token".to_string(), "acc-u1".to_string())]
    );
}

#[tokio::test]
async fn test_authenticated_mode_requires_credentials() {
    let (_store, p) = memory_pipeline();
    let user = User::new("u1", "acc-u1");
    p.store.upsert_user(&user).await.unwrap();

    let outcome = p.engine.sync_one(&user).await.unwrap();

    assert_eq!(outcome, UserSyncOutcome::Skipped(SkipReason::NoCredential));
    assert!(p.api.fetch_calls().is_empty());
}

#[tokio::test]
async fn test_muted_user_is_not_synced() {
    let (_store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    let mut user = seed_user(&*p.store, &p.kms, "u1", t0).await;
    user.notifications_enabled = false;
    p.store.upsert_user(&user).await.unwrap();

    let report = p.engine.sync_all().await;

    assert_eq!(report.candidates, 0);
    assert!(p.api.fetch_calls().is_empty());
}

#[tokio::test]
async fn test_manual_check_during_run_is_serialized() {
    let (store, p) = memory_pipeline();
    let t0 = Utc::now() - Duration::hours(1);
    let user = seed_user(&*p.store, &p.kms, "u1", t0).await;
    p.api.respond(
        "acc-u1",
        FakeFetch::Trophies(vec![earned(
            1,
            TrophyRank::Gold,
            "NPWR1",
            t0 + Duration::minutes(1),
        )]),
    );
    p.api.set_fetch_delay(StdDuration::from_millis(100));

    let engine = p.engine.clone();
    let run = tokio::spawn(async move { engine.sync_all().await });
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    // `user` still carries the old watermark; the check must wait and re-read
    let manual = p.engine.sync_one(&user).await.unwrap();
    let report = run.await.unwrap();

    assert_eq!(report.new_trophies, 1);
    assert_eq!(
        manual,
        UserSyncOutcome::Checked {
            fetched: 1,
            new_trophies: 0,
            notifications: None,
        }
    );
    assert_eq!(p.api.fetch_calls().len(), 2);
    assert_eq!(p.api.max_concurrent_fetches(), 1);
    assert_eq!(p.resolver.sent().len(), 1);
    assert_eq!(store.trophies_for("u1").len(), 1);
    assert_eq!(p.engine.user_lock_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_user_delay_only_between_users() {
    let settings = SyncSettings {
        user_delay: StdDuration::from_secs(10),
        ..fast_settings()
    };
    let p = TestPipeline::with_settings(Arc::new(InMemoryStore::new()), settings);
    let t0 = Utc::now() - Duration::hours(1);
    for id in ["u1", "u2", "u3"] {
        seed_user(&*p.store, &p.kms, id, t0).await;
    }

    let start = tokio::time::Instant::now();
    let report = p.engine.sync_all().await;
    let elapsed = start.elapsed();

    assert_eq!(report.checked, 3);
    // Two gaps for three users, none after the last one
    assert!(elapsed >= StdDuration::from_secs(20), "elapsed {:?}", elapsed);
    assert!(elapsed < StdDuration::from_secs(30), "elapsed {:?}", elapsed);
}
