//! Single-answer export: metadata, translation choice, body conversion,
//! and the YAML frontmatter header.
//!
//! Each answer is two API calls. The metadata envelope (usually already
//! cached by the prefetch pass) carries translation ids and timestamps;
//! the body HTML only arrives when `include_contents` names a specific
//! translation, so it is a second fetch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use kbmirror_client::AssetBundle;
use kbmirror_shared::{AnswerMeta, AnswerStatus, MirrorError, Result, slugify};

use crate::context::ExportContext;

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

/// YAML header for an answer file. Serialized in declaration order; `None`
/// fields are dropped entirely rather than written as nulls.
#[derive(Debug, Serialize)]
pub(crate) struct AnswerFrontmatter {
    pub(crate) title: String,
    pub(crate) slug: String,
    pub(crate) zammad_id: u64,
    pub(crate) status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tags: Option<Vec<String>>,
    /// Always written, even when false. Templates filter on this flag and
    /// an absent key breaks that.
    pub(crate) promoted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) internal_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

/// YAML header for a category `_index.md`.
#[derive(Debug, Serialize)]
pub(crate) struct CategoryFrontmatter {
    pub(crate) title: String,
    pub(crate) zammad_id: u64,
    pub(crate) layout: &'static str,
}

/// Render any serializable header as a `---` fenced YAML block.
pub(crate) fn render_frontmatter<T: Serialize>(fields: &T) -> Result<String> {
    let yaml = serde_yaml::to_string(fields)
        .map_err(|e| MirrorError::Serialize(format!("frontmatter: {e}")))?;
    Ok(format!("---\n{yaml}---"))
}

// ---------------------------------------------------------------------------
// Translation choice
// ---------------------------------------------------------------------------

/// Pick the translation that names this answer: the first one in
/// `translation_ids` order with a non-empty title.
///
/// Multi-locale export is not supported (`kb_locale_id` cannot be mapped
/// to a locale string through the public API), so the first titled
/// translation wins. When no translation has a title the answer keeps a
/// placeholder title and the first translation id. Returns `None` only
/// when the answer has no translations at all.
fn choose_translation(meta: &AnswerMeta, assets: &AssetBundle) -> Option<(String, u64)> {
    let first = *meta.translation_ids.first()?;

    for tid in &meta.translation_ids {
        let title = assets
            .answer_translations
            .get(&tid.to_string())
            .and_then(|t| t.title.as_deref());
        if let Some(title) = title {
            if !title.is_empty() {
                return Some((title.to_string(), *tid));
            }
        }
    }

    Some((format!("Answer {}", meta.id), first))
}

// ---------------------------------------------------------------------------
// Answer export
// ---------------------------------------------------------------------------

impl ExportContext {
    /// Export one answer as `{slug}.md` under the category folder.
    ///
    /// Returns `Ok(true)` when the file was written and `Ok(false)` when
    /// the answer was skipped after a warning. Fetch failures propagate
    /// only when fatal; frontmatter and filesystem errors propagate as-is
    /// and the walker decides their severity.
    pub(crate) async fn export_answer(
        &mut self,
        answer_id: u64,
        cat_parts: &[String],
    ) -> Result<bool> {
        // Step 1: the metadata envelope, normally cached by prefetch.
        // Answers created between prefetch and export fall back to a live
        // fetch (which is not cached: nothing reads it again).
        let envelope = match self.answers.get(&answer_id) {
            Some(envelope) => envelope.clone(),
            None => match self.client.answer(self.kb_id, answer_id).await {
                Ok(envelope) => {
                    self.learn_titles(&envelope.assets);
                    envelope
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(answer_id, error = %e, "skipping answer; metadata fetch failed");
                    return Ok(false);
                }
            },
        };

        // Zammad keys assets by stringified id
        let Some(meta) = envelope.assets.answers.get(&answer_id.to_string()).cloned() else {
            warn!(answer_id, "skipping answer; metadata missing from assets");
            return Ok(false);
        };

        let Some((title, translation_id)) = choose_translation(&meta, &envelope.assets) else {
            warn!(answer_id, "skipping answer; it has no translations");
            return Ok(false);
        };

        let answer_slug = slugify(&title);

        // Step 2: the body HTML for the chosen translation
        let body_envelope = match self
            .client
            .answer_with_contents(self.kb_id, answer_id, translation_id)
            .await
        {
            Ok(envelope) => envelope,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(answer_id, error = %e, "skipping answer; body fetch failed");
                return Ok(false);
            }
        };

        let body_html = body_envelope
            .assets
            .contents
            .get(&translation_id.to_string())
            .and_then(|content| content.body.clone())
            .unwrap_or_default();

        let body_markdown = if body_html.is_empty() {
            String::new()
        } else {
            // Images are rewritten before conversion so the relative src
            // comes out as a Markdown image reference
            let rewritten = self
                .rewrite_images(&body_html, &answer_slug, cat_parts.len())
                .await;
            match kbmirror_markdown::convert(&rewritten) {
                Ok(markdown) => markdown,
                Err(e) => {
                    warn!(answer_id, error = %e, "skipping answer; body conversion failed");
                    return Ok(false);
                }
            }
        };

        let out_path = self.out.answer_path(cat_parts, &answer_slug);

        // Tags come last: the file gets written even when the tag endpoint
        // is closed off or broken
        let tags = self.answer_tags(answer_id).await;

        let mut parts: Vec<String> = Vec::new();
        if self.frontmatter {
            let joined = cat_parts.join("/");
            let header = AnswerFrontmatter {
                title: title.clone(),
                slug: answer_slug.clone(),
                zammad_id: answer_id,
                status: AnswerStatus::derive(&meta),
                category: (!joined.is_empty()).then_some(joined),
                tags: (!tags.is_empty()).then_some(tags),
                promoted: meta.promoted.unwrap_or(false),
                published_at: meta.published_at,
                internal_at: meta.internal_at,
                archived_at: meta.archived_at,
                updated_at: meta.updated_at,
            };
            parts.push(render_frontmatter(&header)?);
        }
        parts.push(format!("# {title}"));
        if !body_markdown.is_empty() {
            parts.push(body_markdown.trim_end().to_string());
        }

        self.out
            .write_markdown(&out_path, &format!("{}\n", parts.join("\n\n")))?;
        Ok(true)
    }

    /// Tags for one answer, via the polymorphic `/tags` endpoint.
    ///
    /// The first 403 turns tag fetching off for the rest of the run; the
    /// token lacks the permission and one warning is enough. Every other
    /// failure, auth included, degrades to no tags for this answer: a tag
    /// problem must never cost the article itself.
    async fn answer_tags(&mut self, answer_id: u64) -> Vec<String> {
        if !self.tags_available {
            return Vec::new();
        }

        match self.client.tags("KnowledgeBaseAnswer", answer_id).await {
            Ok(tags) => tags,
            Err(MirrorError::Forbidden { .. }) => {
                self.tags_available = false;
                warn!(
                    "tag endpoint returned 403; exporting without tags \
                     (the token needs admin.tag permission or an Agent role \
                     in addition to knowledge_base.reader)"
                );
                Vec::new()
            }
            Err(e) => {
                warn!(answer_id, error = %e, "tag fetch failed; this answer gets no tags");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
