//! Translation cache store.
//!
//! Persists detected source locales and translations per content item. One
//! detected locale per item, one translation per (item, locale).

use async_trait::async_trait;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::warn;

use crate::content::{ContentKind, ItemRef};
use crate::locale::{self, LocaleTag};

/// A persisted translation plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub locale: LocaleTag,
    pub text: String,
    /// Provider that produced the text.
    pub translator: String,
    /// Item version the text was translated from.
    pub source_version: DateTime<Utc>,
    /// SHA-256 (hex) of the exact source text sent out.
    pub source_digest: String,
}

impl Translation {
    /// Whether this row was produced from exactly `source_text`.
    pub fn matches_source(&self, source_text: &str) -> bool {
        self.source_digest == source_digest(source_text)
    }
}

/// Content digest used to detect stale cache rows.
pub fn source_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Persistence for detection and translation results.
#[async_trait]
pub trait TranslationStore: Send + Sync {
    async fn get_detected_locale(&self, item: ItemRef) -> Result<Option<LocaleTag>>;

    /// Upsert; re-detection overwrites.
    async fn set_detected_locale(&self, item: ItemRef, locale: &LocaleTag) -> Result<()>;

    async fn get_translation(&self, item: ItemRef, locale: &LocaleTag)
    -> Result<Option<Translation>>;

    /// Upsert keyed by (item, locale).
    async fn set_translation(&self, item: ItemRef, translation: &Translation) -> Result<()>;

    /// Locales that currently have a translation row.
    async fn translated_locales(&self, item: ItemRef) -> Result<Vec<LocaleTag>>;

    /// Delete the detected locale and all translations for an item.
    async fn invalidate_all(&self, item: ItemRef) -> Result<()>;
}

struct Tables {
    detected: &'static str,
    translations: &'static str,
    id_column: &'static str,
}

fn tables(kind: ContentKind) -> Tables {
    match kind {
        ContentKind::Post => Tables {
            detected: "post_detected_locales",
            translations: "post_translations",
            id_column: "post_id",
        },
        ContentKind::Topic => Tables {
            detected: "topic_detected_locales",
            translations: "topic_translations",
            id_column: "topic_id",
        },
        ContentKind::Category => Tables {
            detected: "category_detected_locales",
            translations: "category_translations",
            id_column: "category_id",
        },
        ContentKind::Tag => Tables {
            detected: "tag_detected_locales",
            translations: "tag_translations",
            id_column: "tag_id",
        },
    }
}

#[derive(sqlx::FromRow)]
struct TranslationRow {
    locale: String,
    translation: String,
    translator: String,
    source_version: DateTime<Utc>,
    source_digest: String,
}

/// Postgres-backed store writing the per-kind locale tables.
#[derive(Clone)]
pub struct PgTranslationStore {
    pool: PgPool,
}

impl std::fmt::Debug for PgTranslationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTranslationStore").finish()
    }
}

impl PgTranslationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Parse a locale column, tolerating legacy underscore rows.
fn stored_locale(item: ItemRef, raw: &str) -> Option<LocaleTag> {
    match locale::normalize(raw) {
        Ok(tag) => Some(tag),
        Err(e) => {
            warn!(item = %item, locale = raw, error = %e, "ignoring unparseable stored locale");
            None
        }
    }
}

#[async_trait]
impl TranslationStore for PgTranslationStore {
    async fn get_detected_locale(&self, item: ItemRef) -> Result<Option<LocaleTag>> {
        let t = tables(item.kind);
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT detected_locale FROM {} WHERE {} = $1",
            t.detected, t.id_column
        ))
        .bind(item.id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load detected locale")?;

        Ok(row.and_then(|(raw,)| stored_locale(item, &raw)))
    }

    async fn set_detected_locale(&self, item: ItemRef, locale: &LocaleTag) -> Result<()> {
        let t = tables(item.kind);
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} ({id}, detected_locale, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT ({id}) DO UPDATE SET
                detected_locale = EXCLUDED.detected_locale,
                updated_at = NOW()
            "#,
            table = t.detected,
            id = t.id_column
        ))
        .bind(item.id)
        .bind(locale.as_str())
        .execute(&self.pool)
        .await
        .context("failed to save detected locale")?;

        Ok(())
    }

    async fn get_translation(
        &self,
        item: ItemRef,
        locale: &LocaleTag,
    ) -> Result<Option<Translation>> {
        let t = tables(item.kind);
        let row = sqlx::query_as::<_, TranslationRow>(&format!(
            r#"
            SELECT locale, translation, translator, source_version, source_digest
            FROM {} WHERE {} = $1 AND locale = $2
            "#,
            t.translations, t.id_column
        ))
        .bind(item.id)
        .bind(locale.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to load translation")?;

        Ok(row.and_then(|r| {
            Some(Translation {
                locale: stored_locale(item, &r.locale)?,
                text: r.translation,
                translator: r.translator,
                source_version: r.source_version,
                source_digest: r.source_digest,
            })
        }))
    }

    async fn set_translation(&self, item: ItemRef, translation: &Translation) -> Result<()> {
        let t = tables(item.kind);
        sqlx::query(&format!(
            r#"
            INSERT INTO {table}
                ({id}, locale, translation, translator, source_version, source_digest,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT ({id}, locale) DO UPDATE SET
                translation = EXCLUDED.translation,
                translator = EXCLUDED.translator,
                source_version = EXCLUDED.source_version,
                source_digest = EXCLUDED.source_digest,
                updated_at = NOW()
            "#,
            table = t.translations,
            id = t.id_column
        ))
        .bind(item.id)
        .bind(translation.locale.as_str())
        .bind(&translation.text)
        .bind(&translation.translator)
        .bind(translation.source_version)
        .bind(&translation.source_digest)
        .execute(&self.pool)
        .await
        .context("failed to save translation")?;

        Ok(())
    }

    async fn translated_locales(&self, item: ItemRef) -> Result<Vec<LocaleTag>> {
        let t = tables(item.kind);
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT locale FROM {} WHERE {} = $1 ORDER BY locale",
            t.translations, t.id_column
        ))
        .bind(item.id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list translated locales")?;

        Ok(rows
            .into_iter()
            .filter_map(|(raw,)| stored_locale(item, &raw))
            .collect())
    }

    async fn invalidate_all(&self, item: ItemRef) -> Result<()> {
        let t = tables(item.kind);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin invalidation transaction")?;

        sqlx::query(&format!("DELETE FROM {} WHERE {} = $1", t.detected, t.id_column))
            .bind(item.id)
            .execute(&mut *tx)
            .await
            .context("failed to delete detected locale")?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1",
            t.translations, t.id_column
        ))
        .bind(item.id)
        .execute(&mut *tx)
        .await
        .context("failed to delete translations")?;

        tx.commit()
            .await
            .context("failed to commit invalidation")?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn digest_is_stable_hex() {
        let d = source_digest("Hello world");
        assert_eq!(d.len(), 64);
        assert_eq!(
            d,
            "64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aeca37f3c"
        );
    }

    #[test]
    fn stale_rows_do_not_match_new_source() {
        let row = Translation {
            locale: locale::normalize("de").unwrap(),
            text: "Hallo Welt".into(),
            translator: "deepl".into(),
            source_version: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            source_digest: source_digest("Hello world"),
        };
        assert!(row.matches_source("Hello world"));
        assert!(!row.matches_source("Hello world!"));
    }

    #[test]
    fn every_kind_has_its_own_tables() {
        let names: Vec<_> = ContentKind::ALL
            .iter()
            .map(|k| tables(*k).translations)
            .collect();
        assert_eq!(
            names,
            vec![
                "post_translations",
                "topic_translations",
                "category_translations",
                "tag_translations"
            ]
        );
    }

    #[test]
    fn legacy_underscore_rows_are_read_hyphenated() {
        let tag = stored_locale(ItemRef::post(1), "pt_BR").unwrap();
        assert_eq!(tag.as_str(), "pt-BR");
        assert!(stored_locale(ItemRef::post(1), "??").is_none());
    }
}
