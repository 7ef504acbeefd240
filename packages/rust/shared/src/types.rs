//! Core domain types for the Zammad knowledge base model.
//!
//! These mirror the parts of Zammad's REST payloads the exporter actually
//! uses. Every field beyond the id is `#[serde(default)]`-tolerant because
//! the API omits or nulls fields freely depending on record state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// KnowledgeBase
// ---------------------------------------------------------------------------

/// The root knowledge base record (`/knowledge_bases/{id}`).
///
/// Only the category id list matters here; categories carry the tree
/// structure themselves via `parent_id` and `child_ids`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeBase {
    pub id: u64,
    /// Ids of every category in the KB, roots and children alike.
    #[serde(default)]
    pub category_ids: Vec<u64>,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A knowledge base category (`/knowledge_bases/{kb}/categories/{id}`).
///
/// The category endpoint never carries the category's title; titles live in
/// `KnowledgeBaseCategoryTranslation` assets that only appear in answer
/// responses. `translation_ids` is the key for looking them up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: u64,
    /// `None` marks a root category.
    #[serde(default)]
    pub parent_id: Option<u64>,
    /// Translation ids, in the server's preference order.
    #[serde(default)]
    pub translation_ids: Vec<u64>,
    /// Answers directly in this category.
    #[serde(default)]
    pub answer_ids: Vec<u64>,
    /// Direct child categories.
    #[serde(default)]
    pub child_ids: Vec<u64>,
}

// ---------------------------------------------------------------------------
// AnswerMeta
// ---------------------------------------------------------------------------

/// The `KnowledgeBaseAnswer` asset of an answer response.
///
/// The four timestamps are state markers, not history: whichever ones are
/// set determine the answer's visibility (see [`AnswerStatus::derive`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnswerMeta {
    pub id: u64,
    /// Translation ids, in the server's preference order.
    #[serde(default)]
    pub translation_ids: Vec<u64>,
    /// Zammad emits `null` rather than `false` for never-promoted answers.
    #[serde(default)]
    pub promoted: Option<bool>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub internal_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AnswerStatus
// ---------------------------------------------------------------------------

/// Visibility state derived from an answer's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Draft,
    Internal,
    Published,
    Archived,
}

impl AnswerStatus {
    /// Derive the status from timestamp presence.
    ///
    /// Precedence: archived over published over internal over draft. An
    /// archived answer keeps its `published_at`, so the order matters.
    pub fn derive(meta: &AnswerMeta) -> Self {
        if meta.archived_at.is_some() {
            Self::Archived
        } else if meta.published_at.is_some() {
            Self::Published
        } else if meta.internal_at.is_some() {
            Self::Internal
        } else {
            Self::Draft
        }
    }

    /// The lowercase name used in frontmatter and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Internal => "internal",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
