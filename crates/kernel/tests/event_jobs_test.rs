#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Content event and queued job tests.

use polyglot_kernel::content::{ContentItem, ItemRef};
use polyglot_kernel::cron::{EventJobStats, JOBS_QUEUE, JobOperation, TranslationJob, WorkQueue};
use polyglot_kernel::error::TranslatorError;
use polyglot_kernel::services::content_source::{ContentEvent, handle_content_event};
use polyglot_test_utils::{Harness, MockProvider, tag, test_backfill_settings, test_post};

async fn created(h: &Harness, id: i64, targets: &[&str]) -> usize {
    let targets: Vec<_> = targets.iter().map(|t| tag(t)).collect();
    handle_content_event(
        ContentEvent::Created {
            item: ItemRef::post(id),
        },
        h.store.as_ref(),
        h.queue.as_ref(),
        true,
        &targets,
    )
    .await
    .unwrap()
    .jobs_enqueued
}

#[tokio::test]
async fn created_content_queues_detection_then_translations() {
    let h = Harness::new(MockProvider::new());

    let enqueued = created(&h, 1, &["de", "ja"]).await;

    assert_eq!(enqueued, 3);
    let jobs: Vec<TranslationJob> = h
        .queue
        .pending(JOBS_QUEUE)
        .iter()
        .map(|raw| TranslationJob::from_json(raw).unwrap())
        .collect();
    assert_eq!(jobs[0].operation, JobOperation::Detect);
    assert_eq!(jobs[1].target, Some(tag("de")));
    assert_eq!(jobs[2].target, Some(tag("ja")));
}

#[tokio::test]
async fn auto_translation_off_queues_nothing() {
    let h = Harness::new(MockProvider::new());

    let outcome = handle_content_event(
        ContentEvent::Created {
            item: ItemRef::post(1),
        },
        h.store.as_ref(),
        h.queue.as_ref(),
        false,
        &[tag("de")],
    )
    .await
    .unwrap();

    assert_eq!(outcome.jobs_enqueued, 0);
    assert!(h.queue.is_empty(JOBS_QUEUE).await.unwrap());
}

#[tokio::test]
async fn queued_jobs_are_processed_and_acknowledged() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    h.source.upsert(test_post(1, "Hello world"));
    created(&h, 1, &["de", "ja"]).await;
    let backfill = h.backfill(test_backfill_settings(&["de", "ja"], 10));

    let stats = backfill.process_event_jobs().await.unwrap();

    assert_eq!(
        stats,
        EventJobStats {
            processed: 3,
            ..Default::default()
        }
    );
    assert_eq!(h.store.detected(ItemRef::post(1)), Some(tag("en")));
    assert!(h.store.translation(ItemRef::post(1), "de").is_some());
    assert!(h.store.translation(ItemRef::post(1), "ja").is_some());
    assert!(h.queue.is_empty(JOBS_QUEUE).await.unwrap());
    assert!(h.queue.in_flight(JOBS_QUEUE).is_empty());
    assert_eq!(h.provider.detect_calls(), 1);
}

#[tokio::test]
async fn jobs_for_deleted_content_are_dropped() {
    let h = Harness::new(MockProvider::new());
    created(&h, 1, &["de"]).await;
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = backfill.process_event_jobs().await.unwrap();

    assert_eq!(stats.dropped, 2);
    assert_eq!(h.provider.detect_calls(), 0);
    assert!(h.queue.is_empty(JOBS_QUEUE).await.unwrap());
}

#[tokio::test]
async fn unreadable_jobs_are_dropped() {
    let h = Harness::new(MockProvider::new());
    h.queue.push(JOBS_QUEUE, "not json").await.unwrap();
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = backfill.process_event_jobs().await.unwrap();

    assert_eq!(stats.dropped, 1);
    assert!(h.queue.in_flight(JOBS_QUEUE).is_empty());
}

#[tokio::test]
async fn transient_failures_are_retried_then_given_up() {
    let h = Harness::new(
        MockProvider::new()
            .failing_when("flaky", || TranslatorError::transient("deepl", "timed out")),
    );
    h.source.upsert(test_post(1, "flaky network"));
    created(&h, 1, &["de"]).await;
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let first = backfill.process_event_jobs().await.unwrap();
    assert_eq!(first.requeued, 2);
    let retried: Vec<TranslationJob> = h
        .queue
        .pending(JOBS_QUEUE)
        .iter()
        .map(|raw| TranslationJob::from_json(raw).unwrap())
        .collect();
    assert!(retried.iter().all(|job| job.attempts == 1));

    let second = backfill.process_event_jobs().await.unwrap();
    assert_eq!(second.requeued, 2);

    let third = backfill.process_event_jobs().await.unwrap();
    assert_eq!(third.failed, 2);
    assert_eq!(third.requeued, 0);
    assert!(h.queue.is_empty(JOBS_QUEUE).await.unwrap());
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let h = Harness::new(
        MockProvider::new()
            .failing_when("bad", || TranslatorError::provider("deepl", "HTTP 400")),
    );
    h.source.upsert(test_post(1, "bad request"));
    created(&h, 1, &[]).await;
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = backfill.process_event_jobs().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.requeued, 0);
}

#[tokio::test]
async fn jobs_wait_while_the_provider_is_unconfigured() {
    let h = Harness::new(MockProvider::new().without_credentials());
    h.source.upsert(test_post(1, "Hello"));
    created(&h, 1, &["de"]).await;
    let backfill = h.backfill(test_backfill_settings(&["de"], 10));

    let stats = backfill.process_event_jobs().await.unwrap();

    assert_eq!(stats, EventJobStats::default());
    assert_eq!(h.queue.pending(JOBS_QUEUE).len(), 2);
}

#[tokio::test]
async fn deleted_event_invalidates_without_queueing() {
    let h = Harness::new(MockProvider::new().detecting("en"));
    h.source.upsert(test_post(1, "Hello"));
    h.orchestrator()
        .translate(&ContentItem::from(test_post(1, "Hello")), &tag("de"))
        .await
        .unwrap();

    let outcome = handle_content_event(
        ContentEvent::Deleted {
            item: ItemRef::post(1),
        },
        h.store.as_ref(),
        h.queue.as_ref(),
        true,
        &[tag("de")],
    )
    .await
    .unwrap();

    assert!(outcome.invalidated);
    assert_eq!(outcome.jobs_enqueued, 0);
    assert_eq!(h.store.translation_count(), 0);
}
