#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Postgres translation store tests.
//!
//! These run against the database named by `DATABASE_URL` and are skipped
//! when it is unset. Every test works on fresh item ids so runs can share a
//! database.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use polyglot_kernel::content::{ContentKind, ItemRef};
use polyglot_kernel::db;
use polyglot_kernel::services::translation_store::{
    PgTranslationStore, Translation, TranslationStore, source_digest,
};
use polyglot_test_utils::tag;

async fn connect() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    db::run_migrations(&pool).await.expect("migrations apply");
    Some(pool)
}

fn fresh_id() -> i64 {
    (Uuid::now_v7().as_u128() as u64 >> 1) as i64
}

fn translation(locale: &str, text: &str, source: &str) -> Translation {
    Translation {
        locale: tag(locale),
        text: text.to_string(),
        translator: "deepl".to_string(),
        source_version: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        source_digest: source_digest(source),
    }
}

async fn translation_rows(pool: &PgPool, item: ItemRef) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {}_translations WHERE {}_id = $1",
        item.kind, item.kind
    ))
    .bind(item.id)
    .fetch_one(pool)
    .await
    .unwrap();
    count
}

#[tokio::test]
async fn migrations_create_tables_for_every_kind() {
    let Some(pool) = connect().await else { return };
    let store = PgTranslationStore::new(pool.clone());

    for kind in ContentKind::ALL {
        let item = ItemRef::new(kind, fresh_id());
        store.set_detected_locale(item, &tag("en")).await.unwrap();
        store
            .set_translation(item, &translation("de", "Hallo", "Hello"))
            .await
            .unwrap();

        assert_eq!(store.get_detected_locale(item).await.unwrap(), Some(tag("en")));
        assert_eq!(translation_rows(&pool, item).await, 1, "{kind}");
    }

    // Running them again is a no-op.
    db::run_migrations(&pool).await.unwrap();
}

#[tokio::test]
async fn set_translation_upserts_one_row_per_locale() {
    let Some(pool) = connect().await else { return };
    let store = PgTranslationStore::new(pool.clone());
    let item = ItemRef::post(fresh_id());

    store
        .set_translation(item, &translation("en-GB", "Colour", "Farbe"))
        .await
        .unwrap();
    let newer = translation("en-GB", "Colour, revised", "Farbe, neu");
    store.set_translation(item, &newer).await.unwrap();

    assert_eq!(translation_rows(&pool, item).await, 1);
    let stored = store.get_translation(item, &tag("en_GB")).await.unwrap().unwrap();
    assert_eq!(stored, newer);
    assert_eq!(stored.locale.as_str(), "en-GB");
}

#[tokio::test]
async fn detected_locale_is_overwritten() {
    let Some(pool) = connect().await else { return };
    let store = PgTranslationStore::new(pool);
    let item = ItemRef::topic(fresh_id());

    assert_eq!(store.get_detected_locale(item).await.unwrap(), None);
    store.set_detected_locale(item, &tag("en")).await.unwrap();
    store.set_detected_locale(item, &tag("pt_BR")).await.unwrap();

    assert_eq!(store.get_detected_locale(item).await.unwrap(), Some(tag("pt-BR")));
}

#[tokio::test]
async fn translated_locales_are_listed_in_order() {
    let Some(pool) = connect().await else { return };
    let store = PgTranslationStore::new(pool);
    let item = ItemRef::post(fresh_id());

    for locale in ["ja", "de", "es"] {
        store
            .set_translation(item, &translation(locale, "text", "source"))
            .await
            .unwrap();
    }

    assert_eq!(
        store.translated_locales(item).await.unwrap(),
        vec![tag("de"), tag("es"), tag("ja")]
    );
}

#[tokio::test]
async fn invalidate_all_clears_detection_and_translations() {
    let Some(pool) = connect().await else { return };
    let store = PgTranslationStore::new(pool.clone());
    let item = ItemRef::new(ContentKind::Category, fresh_id());
    let other = ItemRef::new(ContentKind::Category, fresh_id());

    for target in [item, other] {
        store.set_detected_locale(target, &tag("en")).await.unwrap();
        store
            .set_translation(target, &translation("de", "Allgemein", "General"))
            .await
            .unwrap();
        store
            .set_translation(target, &translation("ja", "一般", "General"))
            .await
            .unwrap();
    }

    store.invalidate_all(item).await.unwrap();

    assert_eq!(store.get_detected_locale(item).await.unwrap(), None);
    assert_eq!(translation_rows(&pool, item).await, 0);
    assert!(store.translated_locales(item).await.unwrap().is_empty());
    assert_eq!(store.get_detected_locale(other).await.unwrap(), Some(tag("en")));
    assert_eq!(translation_rows(&pool, other).await, 2);
}
