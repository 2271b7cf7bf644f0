#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Backfill scheduler tests.
//!
//! Candidate selection, per-item failure isolation, rate limiting with a
//! continuation cursor, and the single-flight lock.

use std::time::{Duration, Instant};

use polyglot_kernel::content::{ContentItem, ContentKind, ItemRef, Visibility};
use polyglot_kernel::cron::{
    BackfillResult, BackfillService, BackfillStats, WorkQueue, cursor_queue,
};
use polyglot_kernel::error::TranslatorError;
use polyglot_kernel::services::item_lock::LockManager;
use polyglot_test_utils::{
    Harness, MockProvider, tag, test_backfill_settings, test_category, test_config, test_post,
    test_topic,
};

fn completed(result: BackfillResult) -> BackfillStats {
    match result {
        BackfillResult::Completed(stats) => stats,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn backfills_missing_locales_and_skips_the_source_language() {
    let h = Harness::new(
        MockProvider::new()
            .detecting("en")
            .detecting_when("Hallo", "de"),
    );
    h.source.upsert(test_post(1, "Hello everyone"));
    h.source.upsert(test_post(2, "Hallo zusammen"));
    let backfill = h.backfill(test_backfill_settings(&["de", "es"], 10));

    let stats = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(stats.candidates, 2);
    assert_eq!(stats.detected, 2);
    assert_eq!(stats.translated, 3);
    assert_eq!(stats.failed, 0);
    assert!(!stats.resumable);

    assert!(h.store.translation(ItemRef::post(1), "de").is_some());
    assert!(h.store.translation(ItemRef::post(1), "es").is_some());
    assert!(h.store.translation(ItemRef::post(2), "es").is_some());
    assert!(h.store.translation(ItemRef::post(2), "de").is_none());
}

#[tokio::test]
async fn completed_items_are_not_selected_again() {
    let h = Harness::new(MockProvider::new().detecting("de"));
    h.source.upsert(test_post(1, "Guten Tag"));
    let backfill = h.backfill(test_backfill_settings(&["de", "es"], 10));

    completed(backfill.run(ContentKind::Post).await);
    let second = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(second.candidates, 0);
    assert_eq!(h.provider.detect_calls(), 1);
    assert_eq!(h.provider.translate_calls().len(), 1);
}

#[tokio::test]
async fn one_failing_item_does_not_abort_the_run() {
    let h = Harness::new(
        MockProvider::new()
            .detecting("en")
            .failing_when("item 37 ", || TranslatorError::provider("deepl", "HTTP 500")),
    );
    for id in 1..=50 {
        h.source.upsert(test_post(id, &format!("item {id} needs translating")));
    }
    let backfill = h.backfill(test_backfill_settings(&["de"], 100));

    let stats = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(stats.candidates, 50);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.detected, 49);
    assert_eq!(stats.translated, 49);
    assert!(h.store.translation(ItemRef::post(37), "de").is_none());
    assert!(h.store.translation(ItemRef::post(36), "de").is_some());
    assert!(h.store.translation(ItemRef::post(38), "de").is_some());
}

#[tokio::test]
async fn unsupported_pairs_are_skipped_not_failed() {
    let h = Harness::new(MockProvider::new().detecting("tlh"));
    h.source.upsert(test_post(1, "Qapla'"));
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn rate_limited_runs_resume_from_the_cursor() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    for id in 1..=5 {
        h.source.upsert(test_post(id, &format!("post {id}")));
    }
    let backfill = h.backfill(test_backfill_settings(&["de"], 2));
    let cursor = cursor_queue(ContentKind::Post);

    let first = completed(backfill.run(ContentKind::Post).await);
    assert_eq!(first.candidates, 2);
    assert!(first.resumable);
    assert!(h.store.translation(ItemRef::post(5), "de").is_some());
    assert!(h.store.translation(ItemRef::post(4), "de").is_some());
    assert!(h.store.translation(ItemRef::post(3), "de").is_none());
    assert_eq!(h.queue.pending(&cursor).len(), 1);

    let second = completed(backfill.run(ContentKind::Post).await);
    assert_eq!(second.candidates, 2);
    assert!(h.store.translation(ItemRef::post(3), "de").is_some());
    assert!(h.store.translation(ItemRef::post(2), "de").is_some());

    let third = completed(backfill.run(ContentKind::Post).await);
    assert_eq!(third.candidates, 1);
    assert!(!third.resumable);
    assert!(h.store.translation(ItemRef::post(1), "de").is_some());
    assert!(h.queue.is_empty(&cursor).await.unwrap());
    assert!(h.queue.in_flight(&cursor).is_empty());
}

#[tokio::test]
async fn cursor_left_in_flight_by_a_crash_is_recovered() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    for id in 1..=4 {
        h.source.upsert(test_post(id, &format!("post {id}")));
    }
    let backfill = h.backfill(test_backfill_settings(&["de"], 2));
    let cursor = cursor_queue(ContentKind::Post);

    completed(backfill.run(ContentKind::Post).await);
    // A run that popped the cursor and died before acknowledging it.
    h.queue.pop_batch(&cursor, 1).await.unwrap();
    assert_eq!(h.queue.in_flight(&cursor).len(), 1);

    let resumed = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(resumed.candidates, 2);
    assert!(h.store.translation(ItemRef::post(2), "de").is_some());
    assert!(h.store.translation(ItemRef::post(1), "de").is_some());
}

#[tokio::test]
async fn ineligible_items_are_never_selected() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    let mut system = test_post(1, "Automated notice");
    system.author_id = Some(-1);
    let mut restricted = test_post(2, "Staff only");
    restricted.visibility = Visibility::Restricted;
    let mut deleted = test_post(3, "Gone");
    deleted.deleted = true;
    h.source.upsert(system);
    h.source.upsert(restricted);
    h.source.upsert(deleted);
    h.source.upsert(test_post(4, "Regular post"));
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(stats.candidates, 1);
    assert_eq!(h.store.translation_count(), 1);
    assert!(h.store.translation(ItemRef::post(4), "de").is_some());
}

#[tokio::test]
async fn old_content_is_excluded_by_max_age() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    h.source.upsert(test_post(1, "Ancient history"));
    let mut settings = test_backfill_settings(&["de"], 10);
    settings.max_age = Some(chrono::Duration::days(1));
    let backfill = h.backfill(settings);

    let stats = completed(backfill.run(ContentKind::Post).await);

    assert_eq!(stats.candidates, 0);
}

#[tokio::test]
async fn held_job_lock_skips_the_run() {
    let h = Harness::new(MockProvider::new());
    h.source.upsert(test_post(1, "Hello"));
    h.locks
        .try_acquire("backfill:post", Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    assert!(matches!(backfill.run(ContentKind::Post).await, BackfillResult::Skipped));
    assert_eq!(h.provider.detect_calls(), 0);
}

#[tokio::test]
async fn held_item_lock_is_skipped_without_waiting() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    h.source.upsert(test_post(1, "Being edited"));
    h.source.upsert(test_post(2, "Free to translate"));
    h.locks
        .try_acquire(&ItemRef::post(1).lock_key(), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    let config = test_config();
    assert!(config.orchestrator_options().lock_wait > Duration::from_secs(1));
    let options = config.backfill_orchestrator_options();
    assert_eq!(options.lock_wait, Duration::ZERO);
    let backfill = BackfillService::new(
        h.registry(),
        h.store.clone(),
        h.locks.clone(),
        h.queue.clone(),
        h.source.clone(),
        options,
        test_backfill_settings(&["de"], 10),
    );

    let started = Instant::now();
    let stats = completed(backfill.run(ContentKind::Post).await);

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.candidates, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.translated, 1);
    assert!(h.store.translation(ItemRef::post(1), "de").is_none());
    assert!(h.store.translation(ItemRef::post(2), "de").is_some());
}

#[tokio::test]
async fn job_lock_is_released_after_a_run() {
    let h = Harness::new(MockProvider::new());
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    completed(backfill.run(ContentKind::Post).await);

    assert!(!h.locks.is_held("backfill:post"));
}

#[tokio::test]
async fn disabled_or_zero_rate_does_nothing() {
    let h = Harness::new(MockProvider::new());
    h.source.upsert(test_post(1, "Hello"));

    let mut disabled = test_backfill_settings(&["de"], 10);
    disabled.enabled = false;
    let stats = completed(h.backfill(disabled).run(ContentKind::Post).await);
    assert_eq!(stats, BackfillStats::default());

    let stats = completed(
        h.backfill(test_backfill_settings(&["de"], 0))
            .run(ContentKind::Post)
            .await,
    );
    assert_eq!(stats, BackfillStats::default());

    let stats = completed(
        h.backfill(test_backfill_settings(&[], 10))
            .run(ContentKind::Post)
            .await,
    );
    assert_eq!(stats, BackfillStats::default());
    assert_eq!(h.provider.detect_calls(), 0);
}

#[tokio::test]
async fn misconfigured_provider_fails_the_run() {
    let h = Harness::new(MockProvider::new().without_credentials());
    h.source.upsert(test_post(1, "Hello"));
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let result = backfill.run(ContentKind::Post).await;

    assert!(matches!(result, BackfillResult::Failed(reason) if reason.contains("not configured")));
}

#[tokio::test]
async fn run_all_covers_every_kind() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    h.source.upsert(test_post(1, "A reply"));
    h.source.upsert(test_topic(2, "A topic title"));
    h.source
        .upsert(ContentItem::Category(test_category(3, "General", None)));
    let backfill = h.backfill(test_backfill_settings(&["ja"], 10));

    let results = backfill.run_all().await;

    assert_eq!(results.len(), 4);
    let translated: usize = results
        .into_iter()
        .map(|(_, result)| completed(result).translated)
        .sum();
    assert_eq!(translated, 3);
    assert!(h.store.translation(ItemRef::topic(2), "ja").is_some());
    assert!(
        h.store
            .translation(ItemRef::new(ContentKind::Category, 3), "ja")
            .is_some()
    );
    assert_eq!(h.store.detected(ItemRef::post(1)), Some(tag("en")));
}
