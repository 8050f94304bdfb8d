use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
}

/// The article under edit.
///
/// `tags` is a set: duplicates are dropped on insert and ordering carries no meaning.
/// `slug` follows the title until `slug_manually_edited` is set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub cover_image_url: String,
    #[serde(default)]
    pub cover_image_alt: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub status: PostStatus,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub publish_at: Option<i64>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub focus_keyword: String,
    #[serde(default)]
    pub canonical_url: String,
    #[serde(default)]
    pub slug_manually_edited: bool,
}

/// A partial update to a [`DocumentDraft`]. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DraftPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub category_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub cover_image_url: Option<String>,
    pub cover_image_alt: Option<String>,
    pub visibility: Option<Visibility>,
    pub status: Option<PostStatus>,
    pub publish_at: Option<Option<i64>>,
    pub slug: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub focus_keyword: Option<String>,
    pub canonical_url: Option<String>,
}

impl DraftPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Selection inside `DocumentDraft::body`, in UTF-16 code units (what text areas report).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorRange {
    pub start: usize,
    pub end: usize,
}

impl CursorRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn caret(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Pull a possibly stale range back inside `[0, len]`, keeping `start <= end`.
    pub fn clamped(self, len: usize) -> Self {
        let start = self.start.min(len);
        let end = self.end.min(len);
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// The unit written to (and recovered from) local storage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub saved_at: i64,
    #[serde(flatten)]
    pub draft: DocumentDraft,
}
