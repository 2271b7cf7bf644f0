//! Translatable content model.
//!
//! The host application owns posts, topics, categories and tags. This module
//! mirrors just enough of them to decide what text to detect and translate,
//! plus the `Translatable` capability each kind implements.

pub mod extract;
pub mod filter;
mod item;
pub mod splitter;

pub use filter::{FilterPipeline, TextFilter, TextFormat};
pub use item::{Category, ContentItem, Post, Tag, Topic, Translatable};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kinds of content the translator handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Topic,
    Category,
    Tag,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Post,
        ContentKind::Topic,
        ContentKind::Category,
        ContentKind::Tag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Topic => "topic",
            ContentKind::Category => "category",
            ContentKind::Tag => "tag",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(ContentKind::Post),
            "topic" | "topics" => Ok(ContentKind::Topic),
            "category" | "categories" => Ok(ContentKind::Category),
            "tag" | "tags" => Ok(ContentKind::Tag),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

/// Reference to a single content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ContentKind,
    pub id: i64,
}

impl ItemRef {
    pub fn new(kind: ContentKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn post(id: i64) -> Self {
        Self::new(ContentKind::Post, id)
    }

    pub fn topic(id: i64) -> Self {
        Self::new(ContentKind::Topic, id)
    }

    /// Key for the per-item mutual exclusion lock.
    pub fn lock_key(&self) -> String {
        format!("translate:{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Visibility class of the item's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Restricted,
}

/// Whether an author id belongs to a real user rather than a system or bot
/// identity (those use ids `<= 0`).
pub fn is_real_author(author_id: Option<i64>) -> bool {
    matches!(author_id, Some(id) if id > 0)
}
