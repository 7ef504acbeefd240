//! Shared export state threaded through both walk passes.
//!
//! The context owns the API client and the caches that accumulate while
//! walking a knowledge base: category responses, category titles harvested
//! from answer envelopes, prefetched answer envelopes, and downloaded
//! images. Everything is keyed by Zammad's numeric ids.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use kbmirror_client::{AnswerEnvelope, AssetBundle, ZammadClient};
use kbmirror_shared::{Category, MirrorError, Result, slugify};

use crate::output::OutputTree;

/// Hard ceiling on the ancestor chain when resolving a category's path.
/// Any real knowledge base is a handful of levels deep; hitting this means
/// the parent links are damaged.
pub(crate) const MAX_CATEGORY_DEPTH: usize = 32;

pub struct ExportContext {
    pub(crate) client: ZammadClient,
    pub(crate) kb_id: u64,
    pub(crate) out: OutputTree,
    pub(crate) frontmatter: bool,
    /// Raw category responses, keyed by category id.
    pub(crate) categories: HashMap<u64, Category>,
    /// Category titles, keyed by category translation id.
    ///
    /// The category endpoint itself never carries titles; they only appear
    /// as `KnowledgeBaseCategoryTranslation` assets inside answer
    /// responses, so this map fills up as answers are fetched.
    pub(crate) titles: HashMap<u64, String>,
    /// Answer envelopes cached during the prefetch pass.
    pub(crate) answers: HashMap<u64, AnswerEnvelope>,
    /// Attachment id to on-disk image filename. An attachment referenced
    /// from several answers is downloaded once.
    pub(crate) images: HashMap<u64, String>,
    /// Cleared on the first 403 from the tag endpoint so the export does
    /// not warn once per answer.
    pub(crate) tags_available: bool,
}

impl ExportContext {
    pub fn new(client: ZammadClient, kb_id: u64, output_root: impl Into<std::path::PathBuf>, frontmatter: bool) -> Self {
        Self {
            client,
            kb_id,
            out: OutputTree::new(output_root),
            frontmatter,
            categories: HashMap::new(),
            titles: HashMap::new(),
            answers: HashMap::new(),
            images: HashMap::new(),
            tags_available: true,
        }
    }

    /// Fetch a category, memoized by id. Fetch errors propagate to the
    /// caller, which decides whether to skip the subtree.
    pub(crate) async fn category(&mut self, category_id: u64) -> Result<Category> {
        if let Some(cat) = self.categories.get(&category_id) {
            return Ok(cat.clone());
        }
        let cat = self.client.category(self.kb_id, category_id).await?;
        debug!(category_id, "category fetched");
        self.categories.insert(category_id, cat.clone());
        Ok(cat)
    }

    /// Harvest category titles from an answer envelope's asset bundle.
    /// Later envelopes overwrite earlier ones; Zammad sends the same title
    /// for the same translation id either way.
    pub(crate) fn learn_titles(&mut self, assets: &AssetBundle) {
        for (tid, translation) in &assets.category_translations {
            let Some(title) = translation.title.as_deref() else {
                continue;
            };
            if title.is_empty() {
                continue;
            }
            let Ok(translation_id) = tid.parse::<u64>() else {
                continue;
            };
            self.titles.insert(translation_id, title.to_string());
        }
    }

    /// Best available title for a category.
    ///
    /// Tries each of the category's translation ids against the learned
    /// title map. Categories with no answers anywhere in their subtree
    /// never show up in any envelope, so they fall back to `category-{id}`.
    pub(crate) fn category_title(&self, cat: &Category) -> String {
        for tid in &cat.translation_ids {
            if let Some(title) = self.titles.get(tid) {
                return title.clone();
            }
        }
        format!("category-{}", cat.id)
    }

    /// Folder slugs from the root down to this category, built by walking
    /// the parent chain upward.
    ///
    /// A repeated ancestor or a chain deeper than [`MAX_CATEGORY_DEPTH`]
    /// is reported as a hierarchy error rather than looping forever.
    pub(crate) async fn category_path(&mut self, cat: &Category) -> Result<Vec<String>> {
        let mut parts = vec![slugify(&self.category_title(cat))];
        let mut visited = HashSet::from([cat.id]);
        let mut parent = cat.parent_id;

        while let Some(parent_id) = parent {
            if !visited.insert(parent_id) {
                return Err(MirrorError::hierarchy(format!(
                    "category {} is its own ancestor (cycle through {})",
                    cat.id, parent_id
                )));
            }
            if visited.len() > MAX_CATEGORY_DEPTH {
                return Err(MirrorError::hierarchy(format!(
                    "ancestor chain of category {} exceeds {} levels",
                    cat.id, MAX_CATEGORY_DEPTH
                )));
            }
            let ancestor = self.category(parent_id).await?;
            parts.insert(0, slugify(&self.category_title(&ancestor)));
            parent = ancestor.parent_id;
        }

        Ok(parts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kbmirror_client::CategoryTranslation;

    fn context() -> ExportContext {
        let client = ZammadClient::new("http://localhost:1", "test-token", 0).unwrap();
        ExportContext::new(client, 1, std::env::temp_dir(), true)
    }

    fn category(id: u64, parent_id: Option<u64>, translation_ids: Vec<u64>) -> Category {
        Category {
            id,
            parent_id,
            translation_ids,
            answer_ids: vec![],
            child_ids: vec![],
        }
    }

    fn bundle_with_title(tid: &str, title: Option<&str>) -> AssetBundle {
        let mut assets = AssetBundle::default();
        assets.category_translations.insert(
            tid.to_string(),
            CategoryTranslation {
                title: title.map(String::from),
            },
        );
        assets
    }

    #[test]
    fn learns_titles_from_assets() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("31", Some("Fleet Operations")));

        let cat = category(7, None, vec![31]);
        assert_eq!(ctx.category_title(&cat), "Fleet Operations");
    }

    #[test]
    fn skips_empty_and_missing_titles() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("31", Some("")));
        ctx.learn_titles(&bundle_with_title("32", None));

        assert!(ctx.titles.is_empty());
    }

    #[test]
    fn later_titles_overwrite() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("31", Some("Old Name")));
        ctx.learn_titles(&bundle_with_title("31", Some("New Name")));

        let cat = category(7, None, vec![31]);
        assert_eq!(ctx.category_title(&cat), "New Name");
    }

    #[test]
    fn unknown_category_falls_back_to_id() {
        let ctx = context();
        let cat = category(42, None, vec![99]);
        assert_eq!(ctx.category_title(&cat), "category-42");
    }

    #[test]
    fn title_tries_translation_ids_in_order() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("52", Some("Second Locale")));

        // 51 has no cached title, so the lookup falls through to 52
        let cat = category(7, None, vec![51, 52]);
        assert_eq!(ctx.category_title(&cat), "Second Locale");
    }

    #[tokio::test]
    async fn path_for_root_category() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("31", Some("Fleet Operations")));

        let root = category(7, None, vec![31]);
        let parts = ctx.category_path(&root).await.unwrap();
        assert_eq!(parts, vec!["fleet-operations"]);
    }

    #[tokio::test]
    async fn path_walks_memoized_parents() {
        let mut ctx = context();
        ctx.learn_titles(&bundle_with_title("31", Some("Fleet Operations")));
        ctx.learn_titles(&bundle_with_title("32", Some("Gunnery")));

        let root = category(7, None, vec![31]);
        ctx.categories.insert(7, root);
        let child = category(8, Some(7), vec![32]);

        let parts = ctx.category_path(&child).await.unwrap();
        assert_eq!(parts, vec!["fleet-operations", "gunnery"]);
    }

    #[tokio::test]
    async fn parent_cycle_is_a_hierarchy_error() {
        let mut ctx = context();
        // 7 and 8 point at each other
        ctx.categories.insert(7, category(7, Some(8), vec![]));
        ctx.categories.insert(8, category(8, Some(7), vec![]));

        let start = ctx.categories[&7].clone();
        let err = ctx.category_path(&start).await.unwrap_err();
        assert!(matches!(err, MirrorError::Hierarchy { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn overlong_chain_is_a_hierarchy_error() {
        let mut ctx = context();
        // A strictly linear chain deeper than the ceiling
        for id in 0..(MAX_CATEGORY_DEPTH as u64 + 4) {
            ctx.categories
                .insert(id, category(id, Some(id + 1), vec![]));
        }

        let start = ctx.categories[&0].clone();
        let err = ctx.category_path(&start).await.unwrap_err();
        assert!(matches!(err, MirrorError::Hierarchy { .. }));
    }
}
