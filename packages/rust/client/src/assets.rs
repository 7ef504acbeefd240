//! Wire types for Zammad's side-loaded asset payloads.
//!
//! Answer endpoints return an envelope whose `assets` member carries the
//! related records — answer metadata, translations, bodies, and category
//! translations — each map keyed by **stringified** numeric id.

use std::collections::HashMap;

use serde::Deserialize;

use kbmirror_shared::AnswerMeta;

/// Envelope returned by `/knowledge_bases/{kb}/answers/{id}`.
///
/// The interesting records all ride in `assets`; the top-level object is
/// otherwise ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerEnvelope {
    #[serde(default)]
    pub assets: AssetBundle,
}

/// The `assets` member of an answer envelope.
///
/// Category translations appear here and only here. The category endpoint
/// itself never carries titles, so the exporter harvests them from every
/// answer response it sees.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetBundle {
    #[serde(default, rename = "KnowledgeBaseCategoryTranslation")]
    pub category_translations: HashMap<String, CategoryTranslation>,

    #[serde(default, rename = "KnowledgeBaseAnswer")]
    pub answers: HashMap<String, AnswerMeta>,

    #[serde(default, rename = "KnowledgeBaseAnswerTranslation")]
    pub answer_translations: HashMap<String, AnswerTranslation>,

    /// Only populated when the request passed `include_contents`.
    #[serde(default, rename = "KnowledgeBaseAnswerTranslationContent")]
    pub contents: HashMap<String, AnswerContent>,
}

/// A `KnowledgeBaseCategoryTranslation` asset, keyed by translation id.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryTranslation {
    #[serde(default)]
    pub title: Option<String>,
}

/// A `KnowledgeBaseAnswerTranslation` asset, keyed by translation id.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerTranslation {
    #[serde(default)]
    pub title: Option<String>,
}

/// A `KnowledgeBaseAnswerTranslationContent` asset, keyed by the translation
/// id passed as `include_contents`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerContent {
    #[serde(default)]
    pub body: Option<String>,
}
