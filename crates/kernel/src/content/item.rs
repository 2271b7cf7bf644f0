//! Content kinds and the `Translatable` capability.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extract::{detection_text, join_fields, truncate_chars};
use super::{ContentKind, ItemRef, TextFormat, Visibility};
use crate::locale::LocaleTag;
use crate::services::translation_store::{Translation, TranslationStore};

/// Translation behavior shared by every content kind.
///
/// Text selection is per kind; persistence goes through a
/// [`TranslationStore`] so the item types stay plain data.
#[async_trait]
pub trait Translatable: Send + Sync {
    fn item_ref(&self) -> ItemRef;

    /// Monotonic version of the source text.
    fn version(&self) -> DateTime<Utc>;

    /// Text sent to language detection, already capped.
    fn text_for_detection(&self) -> String;

    /// Text sent for translation, raw or rendered, capped at `max_chars`.
    fn text_for_translation(&self, use_raw: bool, max_chars: usize) -> String;

    /// Format of the text returned by [`Self::text_for_translation`].
    fn text_format(&self, _use_raw: bool) -> TextFormat {
        TextFormat::Plain
    }

    async fn detected_locale(&self, store: &dyn TranslationStore) -> Result<Option<LocaleTag>> {
        store.get_detected_locale(self.item_ref()).await
    }

    async fn set_detected_locale(
        &self,
        store: &dyn TranslationStore,
        locale: &LocaleTag,
    ) -> Result<()> {
        store.set_detected_locale(self.item_ref(), locale).await
    }

    async fn translation_for(
        &self,
        store: &dyn TranslationStore,
        locale: &LocaleTag,
    ) -> Result<Option<Translation>> {
        store.get_translation(self.item_ref(), locale).await
    }

    async fn set_translation(
        &self,
        store: &dyn TranslationStore,
        translation: &Translation,
    ) -> Result<()> {
        store.set_translation(self.item_ref(), translation).await
    }
}

/// A post in a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub topic_id: i64,
    /// 1 for the post that opens the thread.
    pub post_number: i32,
    pub author_id: Option<i64>,
    pub raw: String,
    pub cooked: String,
    pub visibility: Visibility,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_thread_opener(&self) -> bool {
        self.post_number == 1
    }
}

#[async_trait]
impl Translatable for Post {
    fn item_ref(&self) -> ItemRef {
        ItemRef::post(self.id)
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn text_for_detection(&self) -> String {
        detection_text([self.raw.as_str()])
    }

    fn text_for_translation(&self, use_raw: bool, max_chars: usize) -> String {
        let source = if use_raw || self.cooked.trim().is_empty() {
            &self.raw
        } else {
            &self.cooked
        };
        truncate_chars(source, max_chars).to_string()
    }

    fn text_format(&self, use_raw: bool) -> TextFormat {
        if use_raw || self.cooked.trim().is_empty() {
            TextFormat::Markdown
        } else {
            TextFormat::Html
        }
    }
}

/// A topic; its translatable text is the title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    /// Raw text of the opening post, when loaded.
    pub lead_raw: Option<String>,
    pub author_id: Option<i64>,
    pub visibility: Visibility,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
impl Translatable for Topic {
    fn item_ref(&self) -> ItemRef {
        ItemRef::topic(self.id)
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Titles alone are too short for reliable detection.
    fn text_for_detection(&self) -> String {
        detection_text([self.title.as_str(), self.lead_raw.as_deref().unwrap_or("")])
    }

    fn text_for_translation(&self, _use_raw: bool, max_chars: usize) -> String {
        truncate_chars(&self.title, max_chars).to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
impl Translatable for Category {
    fn item_ref(&self) -> ItemRef {
        ItemRef::new(ContentKind::Category, self.id)
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn text_for_detection(&self) -> String {
        detection_text([self.name.as_str(), self.description.as_deref().unwrap_or("")])
    }

    fn text_for_translation(&self, _use_raw: bool, max_chars: usize) -> String {
        let joined = join_fields([self.name.as_str(), self.description.as_deref().unwrap_or("")]);
        truncate_chars(&joined, max_chars).to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
impl Translatable for Tag {
    fn item_ref(&self) -> ItemRef {
        ItemRef::new(ContentKind::Tag, self.id)
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn text_for_detection(&self) -> String {
        detection_text([self.name.as_str(), self.description.as_deref().unwrap_or("")])
    }

    fn text_for_translation(&self, _use_raw: bool, max_chars: usize) -> String {
        let joined = join_fields([self.name.as_str(), self.description.as_deref().unwrap_or("")]);
        truncate_chars(&joined, max_chars).to_string()
    }
}

/// Any translatable item, dispatching to its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentItem {
    Post(Post),
    Topic(Topic),
    Category(Category),
    Tag(Tag),
}

macro_rules! each_kind {
    ($self:expr, $item:ident => $body:expr) => {
        match $self {
            ContentItem::Post($item) => $body,
            ContentItem::Topic($item) => $body,
            ContentItem::Category($item) => $body,
            ContentItem::Tag($item) => $body,
        }
    };
}

impl ContentItem {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentItem::Post(_) => ContentKind::Post,
            ContentItem::Topic(_) => ContentKind::Topic,
            ContentItem::Category(_) => ContentKind::Category,
            ContentItem::Tag(_) => ContentKind::Tag,
        }
    }

    /// Author, for kinds that have one.
    pub fn author_id(&self) -> Option<i64> {
        match self {
            ContentItem::Post(p) => p.author_id,
            ContentItem::Topic(t) => t.author_id,
            ContentItem::Category(_) | ContentItem::Tag(_) => None,
        }
    }

    pub fn has_author(&self) -> bool {
        matches!(self, ContentItem::Post(_) | ContentItem::Topic(_))
    }

    pub fn visibility(&self) -> Visibility {
        each_kind!(self, item => item.visibility)
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            ContentItem::Post(p) => p.deleted,
            ContentItem::Topic(t) => t.deleted,
            ContentItem::Category(_) | ContentItem::Tag(_) => false,
        }
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            ContentItem::Post(p) => Some(p),
            _ => None,
        }
    }
}

#[async_trait]
impl Translatable for ContentItem {
    fn item_ref(&self) -> ItemRef {
        each_kind!(self, item => item.item_ref())
    }

    fn version(&self) -> DateTime<Utc> {
        each_kind!(self, item => item.version())
    }

    fn text_for_detection(&self) -> String {
        each_kind!(self, item => item.text_for_detection())
    }

    fn text_for_translation(&self, use_raw: bool, max_chars: usize) -> String {
        each_kind!(self, item => item.text_for_translation(use_raw, max_chars))
    }

    fn text_format(&self, use_raw: bool) -> TextFormat {
        each_kind!(self, item => item.text_format(use_raw))
    }
}

impl From<Post> for ContentItem {
    fn from(p: Post) -> Self {
        ContentItem::Post(p)
    }
}

impl From<Topic> for ContentItem {
    fn from(t: Topic) -> Self {
        ContentItem::Topic(t)
    }
}

impl From<Category> for ContentItem {
    fn from(c: Category) -> Self {
        ContentItem::Category(c)
    }
}

impl From<Tag> for ContentItem {
    fn from(t: Tag) -> Self {
        ContentItem::Tag(t)
    }
}
