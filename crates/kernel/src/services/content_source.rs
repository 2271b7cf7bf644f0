//! Read-only access to the host's content tables, and content events.
//!
//! The host application owns `posts`, `topics`, `categories` and `tags`.
//! Mutations reach the translator as [`ContentEvent`]s, which invalidate
//! stored results and queue fresh work.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::content::{
    Category, ContentItem, ContentKind, ItemRef, Post, Tag, Topic, Translatable, Visibility,
    is_real_author,
};
use crate::cron::queue::{JOBS_QUEUE, TranslationJob, WorkQueue};
use crate::locale::LocaleTag;
use crate::services::translation_store::TranslationStore;

/// Position in a newest-first scan. Pages continue strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub updated_at: DateTime<Utc>,
    pub id: i64,
}

impl ScanCursor {
    pub fn of(item: &ContentItem) -> Self {
        Self {
            updated_at: item.version(),
            id: item.item_ref().id,
        }
    }

    /// Whether `(updated_at, id)` sorts after this cursor in a descending scan.
    pub fn precedes(&self, updated_at: DateTime<Utc>, id: i64) -> bool {
        (updated_at, id) < (self.updated_at, self.id)
    }
}

/// Eligibility rules for background translation.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub public_only: bool,
    pub max_age: Option<chrono::Duration>,
    pub now: DateTime<Utc>,
}

impl CandidateFilter {
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.max_age.map(|age| self.now - age)
    }

    /// Not deleted, real author where the kind has one, some text, public
    /// when required, and recent enough.
    pub fn admits(&self, item: &ContentItem) -> bool {
        if item.is_deleted() {
            return false;
        }
        if item.has_author() && !is_real_author(item.author_id()) {
            return false;
        }
        if self.public_only && item.visibility() != Visibility::Public {
            return false;
        }
        if let Some(cutoff) = self.cutoff()
            && item.version() < cutoff
        {
            return false;
        }
        !item.text_for_detection().trim().is_empty()
    }
}

/// The content corpus, as the translator sees it.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get(&self, item: ItemRef) -> Result<Option<ContentItem>>;

    /// Eligible items of `kind`, newest first by `(updated_at, id)`, strictly
    /// after `after` when given.
    async fn eligible_page(
        &self,
        kind: ContentKind,
        filter: &CandidateFilter,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<ContentItem>>;
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    topic_id: i64,
    post_number: i32,
    author_id: Option<i64>,
    raw: String,
    cooked: String,
    restricted: bool,
    deleted: bool,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TopicRow {
    id: i64,
    title: String,
    lead_raw: Option<String>,
    author_id: Option<i64>,
    restricted: bool,
    deleted: bool,
    updated_at: DateTime<Utc>,
}

/// Categories and tags share a shape.
#[derive(sqlx::FromRow)]
struct NamedRow {
    id: i64,
    name: String,
    description: Option<String>,
    restricted: bool,
    updated_at: DateTime<Utc>,
}

fn visibility(restricted: bool) -> Visibility {
    if restricted {
        Visibility::Restricted
    } else {
        Visibility::Public
    }
}

impl From<PostRow> for ContentItem {
    fn from(row: PostRow) -> Self {
        ContentItem::Post(Post {
            id: row.id,
            topic_id: row.topic_id,
            post_number: row.post_number,
            author_id: row.author_id,
            raw: row.raw,
            cooked: row.cooked,
            visibility: visibility(row.restricted),
            deleted: row.deleted,
            updated_at: row.updated_at,
        })
    }
}

impl From<TopicRow> for ContentItem {
    fn from(row: TopicRow) -> Self {
        ContentItem::Topic(Topic {
            id: row.id,
            title: row.title,
            lead_raw: row.lead_raw,
            author_id: row.author_id,
            visibility: visibility(row.restricted),
            deleted: row.deleted,
            updated_at: row.updated_at,
        })
    }
}

impl NamedRow {
    fn into_category(self) -> ContentItem {
        ContentItem::Category(Category {
            id: self.id,
            name: self.name,
            description: self.description,
            visibility: visibility(self.restricted),
            updated_at: self.updated_at,
        })
    }

    fn into_tag(self) -> ContentItem {
        ContentItem::Tag(Tag {
            id: self.id,
            name: self.name,
            description: self.description,
            visibility: visibility(self.restricted),
            updated_at: self.updated_at,
        })
    }
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.topic_id, p.post_number, p.user_id AS author_id, p.raw, p.cooked,
           COALESCE(c.read_restricted, FALSE) AS restricted,
           (p.deleted_at IS NOT NULL OR t.deleted_at IS NOT NULL) AS deleted,
           p.updated_at
    FROM posts p
    JOIN topics t ON t.id = p.topic_id
    LEFT JOIN categories c ON c.id = t.category_id
"#;

const POST_ELIGIBLE: &str = r#"
    WHERE p.deleted_at IS NULL AND t.deleted_at IS NULL
      AND p.user_id > 0
      AND length(trim(p.raw)) > 0
      AND ($1::timestamptz IS NULL OR (p.updated_at, p.id) < ($1, $2))
      AND ($3::timestamptz IS NULL OR p.updated_at >= $3)
      AND (NOT $4 OR NOT COALESCE(c.read_restricted, FALSE))
    ORDER BY p.updated_at DESC, p.id DESC
    LIMIT $5
"#;

const TOPIC_SELECT: &str = r#"
    SELECT t.id, t.title, lp.raw AS lead_raw, t.user_id AS author_id,
           COALESCE(c.read_restricted, FALSE) AS restricted,
           (t.deleted_at IS NOT NULL) AS deleted,
           t.updated_at
    FROM topics t
    LEFT JOIN posts lp ON lp.topic_id = t.id AND lp.post_number = 1
    LEFT JOIN categories c ON c.id = t.category_id
"#;

const TOPIC_ELIGIBLE: &str = r#"
    WHERE t.deleted_at IS NULL
      AND t.user_id > 0
      AND length(trim(t.title)) > 0
      AND ($1::timestamptz IS NULL OR (t.updated_at, t.id) < ($1, $2))
      AND ($3::timestamptz IS NULL OR t.updated_at >= $3)
      AND (NOT $4 OR NOT COALESCE(c.read_restricted, FALSE))
    ORDER BY t.updated_at DESC, t.id DESC
    LIMIT $5
"#;

const CATEGORY_SELECT: &str = r#"
    SELECT id, name, description, read_restricted AS restricted, updated_at
    FROM categories
"#;

const TAG_SELECT: &str = r#"
    SELECT id, name, description, FALSE AS restricted, updated_at
    FROM tags
"#;

/// Shared by categories and tags; `restricted` is a column alias.
const NAMED_ELIGIBLE: &str = r#"
    WHERE length(trim(name)) > 0
      AND ($1::timestamptz IS NULL OR (updated_at, id) < ($1, $2))
      AND ($3::timestamptz IS NULL OR updated_at >= $3)
      AND (NOT $4 OR NOT restricted)
    ORDER BY updated_at DESC, id DESC
    LIMIT $5
"#;

/// Content source over the host's PostgreSQL tables.
#[derive(Clone)]
pub struct PgContentSource {
    pool: PgPool,
}

impl std::fmt::Debug for PgContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgContentSource").finish()
    }
}

impl PgContentSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn named_page(
        &self,
        select: &str,
        filter: &CandidateFilter,
        after: Option<ScanCursor>,
        limit: i64,
    ) -> Result<Vec<NamedRow>> {
        let sql = format!("SELECT * FROM ({select}) named {NAMED_ELIGIBLE}");
        let rows = sqlx::query_as::<_, NamedRow>(&sql)
            .bind(after.map(|c| c.updated_at))
            .bind(after.map(|c| c.id))
            .bind(filter.cutoff())
            .bind(filter.public_only)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ContentSource for PgContentSource {
    async fn get(&self, item: ItemRef) -> Result<Option<ContentItem>> {
        let found = match item.kind {
            ContentKind::Post => {
                sqlx::query_as::<_, PostRow>(&format!("{POST_SELECT} WHERE p.id = $1"))
                    .bind(item.id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("failed to load post")?
                    .map(ContentItem::from)
            }
            ContentKind::Topic => {
                sqlx::query_as::<_, TopicRow>(&format!("{TOPIC_SELECT} WHERE t.id = $1"))
                    .bind(item.id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("failed to load topic")?
                    .map(ContentItem::from)
            }
            ContentKind::Category => {
                sqlx::query_as::<_, NamedRow>(&format!("{CATEGORY_SELECT} WHERE id = $1"))
                    .bind(item.id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("failed to load category")?
                    .map(NamedRow::into_category)
            }
            ContentKind::Tag => {
                sqlx::query_as::<_, NamedRow>(&format!("{TAG_SELECT} WHERE id = $1"))
                    .bind(item.id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("failed to load tag")?
                    .map(NamedRow::into_tag)
            }
        };
        Ok(found)
    }

    async fn eligible_page(
        &self,
        kind: ContentKind,
        filter: &CandidateFilter,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let items = match kind {
            ContentKind::Post => {
                sqlx::query_as::<_, PostRow>(&format!("{POST_SELECT} {POST_ELIGIBLE}"))
                    .bind(after.map(|c| c.updated_at))
                    .bind(after.map(|c| c.id))
                    .bind(filter.cutoff())
                    .bind(filter.public_only)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .context("failed to page posts")?
                    .into_iter()
                    .map(ContentItem::from)
                    .collect()
            }
            ContentKind::Topic => {
                sqlx::query_as::<_, TopicRow>(&format!("{TOPIC_SELECT} {TOPIC_ELIGIBLE}"))
                    .bind(after.map(|c| c.updated_at))
                    .bind(after.map(|c| c.id))
                    .bind(filter.cutoff())
                    .bind(filter.public_only)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .context("failed to page topics")?
                    .into_iter()
                    .map(ContentItem::from)
                    .collect()
            }
            ContentKind::Category => self
                .named_page(CATEGORY_SELECT, filter, after, limit)
                .await
                .context("failed to page categories")?
                .into_iter()
                .map(NamedRow::into_category)
                .collect(),
            ContentKind::Tag => self
                .named_page(TAG_SELECT, filter, after, limit)
                .await
                .context("failed to page tags")?
                .into_iter()
                .map(NamedRow::into_tag)
                .collect(),
        };
        Ok(items)
    }
}

/// A mutation reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    Created { item: ItemRef },
    Edited { item: ItemRef, text_changed: bool },
    Deleted { item: ItemRef },
}

impl ContentEvent {
    pub fn item(&self) -> ItemRef {
        match self {
            ContentEvent::Created { item }
            | ContentEvent::Edited { item, .. }
            | ContentEvent::Deleted { item } => *item,
        }
    }

    fn invalidates(&self) -> bool {
        matches!(
            self,
            ContentEvent::Deleted { .. } | ContentEvent::Edited { text_changed: true, .. }
        )
    }

    fn schedules_work(&self) -> bool {
        matches!(
            self,
            ContentEvent::Created { .. } | ContentEvent::Edited { text_changed: true, .. }
        )
    }
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub invalidated: bool,
    pub jobs_enqueued: usize,
}

/// Apply a content event: drop stale results, then queue detection and one
/// translation job per target when auto-translation is on.
pub async fn handle_content_event(
    event: ContentEvent,
    store: &dyn TranslationStore,
    queue: &dyn WorkQueue,
    auto_translate: bool,
    targets: &[LocaleTag],
) -> Result<EventOutcome> {
    let item = event.item();
    let mut outcome = EventOutcome::default();

    if event.invalidates() {
        store
            .invalidate_all(item)
            .await
            .with_context(|| format!("failed to invalidate {item}"))?;
        outcome.invalidated = true;
        info!(item = %item, "invalidated translations");
    }

    if auto_translate && event.schedules_work() {
        let mut jobs = vec![TranslationJob::detect(item)];
        jobs.extend(targets.iter().cloned().map(|t| TranslationJob::translate(item, t)));
        for job in &jobs {
            queue.push(JOBS_QUEUE, &job.to_json()?).await?;
        }
        outcome.jobs_enqueued = jobs.len();
        debug!(item = %item, jobs = jobs.len(), "queued translation jobs");
    }

    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn post(author_id: Option<i64>, raw: &str) -> ContentItem {
        ContentItem::Post(Post {
            id: 1,
            topic_id: 1,
            post_number: 2,
            author_id,
            raw: raw.into(),
            cooked: String::new(),
            visibility: Visibility::Public,
            deleted: false,
            updated_at: Utc::now(),
        })
    }

    fn filter() -> CandidateFilter {
        CandidateFilter {
            public_only: true,
            max_age: Some(chrono::Duration::days(30)),
            now: Utc::now(),
        }
    }

    #[test]
    fn filter_rejects_system_authors_and_empty_text() {
        let f = filter();
        assert!(f.admits(&post(Some(4), "Hello")));
        assert!(!f.admits(&post(Some(-1), "Hello")));
        assert!(!f.admits(&post(None, "Hello")));
        assert!(!f.admits(&post(Some(4), "   ")));
    }

    #[test]
    fn filter_applies_visibility_and_age() {
        let f = filter();
        let mut item = post(Some(4), "Hello");
        if let ContentItem::Post(p) = &mut item {
            p.visibility = Visibility::Restricted;
        }
        assert!(!f.admits(&item));
        assert!(CandidateFilter { public_only: false, ..f.clone() }.admits(&item));

        let mut old = post(Some(4), "Hello");
        if let ContentItem::Post(p) = &mut old {
            p.updated_at = f.now - chrono::Duration::days(31);
        }
        assert!(!f.admits(&old));
        assert!(CandidateFilter { max_age: None, ..f }.admits(&old));
    }

    #[test]
    fn categories_need_no_author() {
        let item = ContentItem::Category(Category {
            id: 2,
            name: "General".into(),
            description: None,
            visibility: Visibility::Public,
            updated_at: Utc::now(),
        });
        assert!(filter().admits(&item));
    }

    #[test]
    fn cursor_ordering_is_descending() {
        let now = Utc::now();
        let cursor = ScanCursor { updated_at: now, id: 10 };
        assert!(cursor.precedes(now, 9));
        assert!(!cursor.precedes(now, 10));
        assert!(!cursor.precedes(now, 11));
        assert!(cursor.precedes(now - chrono::Duration::seconds(1), 99));
    }

    #[test]
    fn event_json_shape() {
        let event: ContentEvent = serde_json::from_str(
            r#"{"event":"edited","item":{"kind":"post","id":5},"text_changed":true}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ContentEvent::Edited { item: ItemRef::post(5), text_changed: true }
        );
        assert!(event.invalidates());
        assert!(event.schedules_work());

        let metadata_only = ContentEvent::Edited { item: ItemRef::post(5), text_changed: false };
        assert!(!metadata_only.invalidates());
        assert!(!metadata_only.schedules_work());
    }
}
