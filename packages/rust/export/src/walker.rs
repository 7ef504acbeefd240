//! The two-pass category walk.
//!
//! Pass 1 (prefetch) fetches every answer's metadata envelope so that all
//! category titles are known before any folder name is resolved. Without
//! it, categories walked before their first answer would get fallback
//! folder names. Pass 2 writes `_index.md` for every category and one
//! Markdown file per answer, recursing through `child_ids`.
//!
//! Both passes carry a visited set and a depth bound, so a knowledge base
//! with looping child links finishes with warnings instead of hanging.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use kbmirror_shared::{MirrorError, Result};

use crate::answers::{CategoryFrontmatter, render_frontmatter};
use crate::context::{ExportContext, MAX_CATEGORY_DEPTH};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Hooks for surfacing walk progress in a UI. All methods default to
/// no-ops; reporters implement what they need.
pub trait ProgressReporter: Send + Sync {
    /// A new phase of the export began.
    fn phase(&self, _label: &str) {}
    /// A category is currently being written; `path` is its folder path.
    fn category(&self, _path: &str) {}
    /// The export finished.
    fn done(&self) {}
}

/// Reporter that swallows everything, for tests and library callers.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What an export run produced.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Categories written (skipped subtrees not included).
    pub categories: usize,
    /// Answers that produced a file.
    pub answers_written: usize,
    /// Answers encountered in the walk, written or not.
    pub answers_total: usize,
    /// Distinct images downloaded.
    pub images: usize,
    pub elapsed: Duration,
}

#[derive(Default)]
struct WalkStats {
    categories: usize,
    answers_written: usize,
    answers_total: usize,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Export one knowledge base into the context's output tree.
///
/// Fatal errors (bad config, rejected token, missing permission) abort the
/// run; everything else is logged and the walk continues, so a single
/// broken category or answer costs only itself.
#[instrument(skip_all, fields(kb_id = ctx.kb_id))]
pub async fn run_export(
    ctx: &mut ExportContext,
    progress: &dyn ProgressReporter,
) -> Result<ExportSummary> {
    let started = Instant::now();

    let kb = match ctx.client.knowledge_base(ctx.kb_id).await {
        Ok(kb) => kb,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            return Err(MirrorError::config(format!(
                "could not fetch knowledge base {}: {e}; check kb_id",
                ctx.kb_id
            )));
        }
    };

    // Roots are the categories without a parent; children are reached
    // through recursion. This loop also warms the category cache.
    let mut roots = Vec::new();
    for &category_id in &kb.category_ids {
        match ctx.category(category_id).await {
            Ok(cat) if cat.parent_id.is_none() => roots.push(cat.id),
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(category_id, error = %e, "skipping category; could not determine its parent");
            }
        }
    }

    info!(
        total = kb.category_ids.len(),
        roots = roots.len(),
        "categories discovered"
    );

    progress.phase("prefetching answer metadata");
    let mut visited = HashSet::new();
    for &root in &roots {
        ctx.prefetch_category(root, &mut visited, 0).await?;
    }

    progress.phase("writing files");
    let mut stats = WalkStats::default();
    let mut visited = HashSet::new();
    for &root in &roots {
        ctx.export_category(root, &mut visited, 0, &mut stats, progress)
            .await?;
    }

    let summary = ExportSummary {
        categories: stats.categories,
        answers_written: stats.answers_written,
        answers_total: stats.answers_total,
        images: ctx.images.len(),
        elapsed: started.elapsed(),
    };
    info!(
        categories = summary.categories,
        answers_written = summary.answers_written,
        answers_total = summary.answers_total,
        images = summary.images,
        "export complete"
    );
    progress.done();
    Ok(summary)
}

// ---------------------------------------------------------------------------
// The two passes
// ---------------------------------------------------------------------------

impl ExportContext {
    /// Pass 1: walk the subtree and cache the metadata envelope for every
    /// answer, harvesting category titles along the way.
    async fn prefetch_category(
        &mut self,
        category_id: u64,
        visited: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<()> {
        if !visited.insert(category_id) {
            warn!(category_id, "category seen twice during prefetch; the child links loop");
            return Ok(());
        }
        if depth > MAX_CATEGORY_DEPTH {
            warn!(category_id, depth, "category tree too deep; skipping subtree");
            return Ok(());
        }

        let cat = match self.category(category_id).await {
            Ok(cat) => cat,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(category_id, error = %e, "could not fetch category during prefetch");
                return Ok(());
            }
        };

        for &answer_id in &cat.answer_ids {
            if self.answers.contains_key(&answer_id) {
                continue;
            }
            match self.client.answer(self.kb_id, answer_id).await {
                Ok(envelope) => {
                    self.learn_titles(&envelope.assets);
                    self.answers.insert(answer_id, envelope);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(answer_id, error = %e, "prefetch failed for answer"),
            }
        }

        for &child_id in &cat.child_ids {
            Box::pin(self.prefetch_category(child_id, visited, depth + 1)).await?;
        }
        Ok(())
    }

    /// Pass 2: write this category's `_index.md` and answers, then recurse
    /// into its children.
    async fn export_category(
        &mut self,
        category_id: u64,
        visited: &mut HashSet<u64>,
        depth: usize,
        stats: &mut WalkStats,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        if !visited.insert(category_id) {
            warn!(category_id, "category already exported; the child links loop");
            return Ok(());
        }
        if depth > MAX_CATEGORY_DEPTH {
            warn!(category_id, depth, "category tree too deep; skipping subtree");
            return Ok(());
        }

        let cat = match self.category(category_id).await {
            Ok(cat) => cat,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(category_id, error = %e, "skipping category; could not fetch it");
                return Ok(());
            }
        };

        // The folder path walks the parent chain; a damaged chain costs
        // this subtree, not the export
        let parts = match self.category_path(&cat).await {
            Ok(parts) => parts,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(category_id, error = %e, "skipping category subtree");
                return Ok(());
            }
        };

        let title = self.category_title(&cat);
        let shown = parts.join("/");
        progress.category(&shown);
        info!(category_id, path = %shown, "exporting category");

        match self.write_category_index(&title, cat.id, &parts) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(category_id, error = %e, "could not write category index"),
        }

        stats.answers_total += cat.answer_ids.len();
        let mut written_here = 0usize;
        for &answer_id in &cat.answer_ids {
            match self.export_answer(answer_id, &parts).await {
                Ok(true) => {
                    stats.answers_written += 1;
                    written_here += 1;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(answer_id, error = %e, "skipping answer; export failed"),
            }
        }
        if !cat.answer_ids.is_empty() {
            info!(
                category_id,
                written = written_here,
                total = cat.answer_ids.len(),
                "answers written"
            );
        }
        stats.categories += 1;

        for &child_id in &cat.child_ids {
            Box::pin(self.export_category(child_id, visited, depth + 1, stats, progress)).await?;
        }
        Ok(())
    }

    /// Write the category landing page.
    fn write_category_index(&self, title: &str, category_id: u64, parts: &[String]) -> Result<()> {
        let mut sections: Vec<String> = Vec::new();
        if self.frontmatter {
            let header = CategoryFrontmatter {
                title: title.to_string(),
                zammad_id: category_id,
                layout: "category",
            };
            sections.push(render_frontmatter(&header)?);
        }
        sections.push(format!("# {title}"));

        let path = self.out.index_path(parts);
        self.out
            .write_markdown(&path, &format!("{}\n", sections.join("\n\n")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kbmirror_client::ZammadClient;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context_for(server_uri: &str, out_root: &std::path::Path) -> ExportContext {
        let client = ZammadClient::new(server_uri, "test-token", 0).unwrap();
        ExportContext::new(client, 1, out_root, true)
    }

    async fn mount_kb(server: &MockServer, category_ids: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/v1/knowledge_bases/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": 1, "category_ids": category_ids })),
            )
            .mount(server)
            .await;
    }

    async fn mount_category(
        server: &MockServer,
        id: u64,
        parent_id: serde_json::Value,
        translation_ids: serde_json::Value,
        answer_ids: serde_json::Value,
        child_ids: serde_json::Value,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/knowledge_bases/1/categories/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "parent_id": parent_id,
                "translation_ids": translation_ids,
                "answer_ids": answer_ids,
                "child_ids": child_ids
            })))
            .mount(server)
            .await;
    }

    /// Mounts both fetch steps for one answer. The metadata step carries
    /// the category translations so prefetch can learn folder names, and
    /// expects exactly one request: the export must reuse the prefetched
    /// envelope instead of fetching again.
    async fn mount_answer(
        server: &MockServer,
        answer_id: u64,
        tid: u64,
        title: &str,
        body: &str,
        category_titles: serde_json::Value,
    ) {
        let assets = json!({
            "KnowledgeBaseAnswer": {
                answer_id.to_string(): {
                    "id": answer_id,
                    "translation_ids": [tid],
                    "promoted": null,
                    "published_at": "2024-03-01T12:00:00Z",
                    "updated_at": "2024-03-02T08:30:00Z"
                }
            },
            "KnowledgeBaseAnswerTranslation": {
                tid.to_string(): { "id": tid, "title": title }
            },
            "KnowledgeBaseCategoryTranslation": category_titles
        });

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/knowledge_bases/1/answers/{answer_id}")))
            .and(query_param_is_missing("include_contents"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": answer_id, "assets": assets })),
            )
            .expect(1)
            .mount(server)
            .await;

        let mut with_body = assets;
        with_body["KnowledgeBaseAnswerTranslationContent"] =
            json!({ tid.to_string(): { "id": tid, "body": body } });
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/knowledge_bases/1/answers/{answer_id}")))
            .and(query_param("include_contents", tid.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": answer_id, "assets": with_body })),
            )
            .mount(server)
            .await;
    }

    async fn mount_tags(server: &MockServer, answer_id: u64, tags: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/v1/tags"))
            .and(query_param("object", "KnowledgeBaseAnswer"))
            .and(query_param("o_id", answer_id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": tags })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_export_writes_the_tree() {
        let server = MockServer::start().await;

        mount_kb(&server, json!([10, 11, 20])).await;
        mount_category(&server, 10, json!(null), json!([31]), json!([100]), json!([11])).await;
        mount_category(&server, 11, json!(10), json!([32]), json!([101]), json!([])).await;
        // No answers anywhere in its subtree: title stays unknown
        mount_category(&server, 20, json!(null), json!([33]), json!([]), json!([])).await;

        mount_answer(
            &server,
            100,
            1001,
            "Docking Procedures",
            r#"<p>Align first.</p><p><img src="/api/v1/attachments/46"></p>"#,
            json!({ "31": { "id": 31, "title": "Fleet Operations" } }),
        )
        .await;
        mount_answer(
            &server,
            101,
            1011,
            "Turret Calibration",
            r#"<p>Shared diagram:</p><img src="/api/v1/attachments/46">"#,
            json!({
                "31": { "id": 31, "title": "Fleet Operations" },
                "32": { "id": 32, "title": "Gunnery" }
            }),
        )
        .await;
        mount_tags(&server, 100, json!(["ops"])).await;
        mount_tags(&server, 101, json!([])).await;

        // Referenced from both answers, downloaded once
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/46"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"PNGDATA".to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let summary = run_export(&mut ctx, &SilentProgress).await.unwrap();

        assert_eq!(summary.categories, 3);
        assert_eq!(summary.answers_written, 2);
        assert_eq!(summary.answers_total, 2);
        assert_eq!(summary.images, 1);

        // Folder names come from titles learned during prefetch
        let root_index =
            std::fs::read_to_string(tmp.path().join("fleet-operations/_index.md")).unwrap();
        assert_eq!(
            root_index,
            "---\ntitle: Fleet Operations\nzammad_id: 10\nlayout: category\n---\n\n# Fleet Operations\n"
        );

        let answer = std::fs::read_to_string(
            tmp.path().join("fleet-operations/docking-procedures.md"),
        )
        .unwrap();
        assert!(answer.contains("category: fleet-operations\n"));
        assert!(answer.contains("tags:\n- ops\n"));
        assert!(answer.contains("![](../images/docking-procedures-1.png)"));

        // Nested answer: two folders deep, same cached image file
        let nested = std::fs::read_to_string(
            tmp.path().join("fleet-operations/gunnery/turret-calibration.md"),
        )
        .unwrap();
        assert!(nested.contains("category: fleet-operations/gunnery\n"));
        assert!(nested.contains("![](../../images/docking-procedures-1.png)"));
        assert!(!nested.contains("tags:"));

        // Title never learned: folder falls back to the category id
        let fallback = std::fs::read_to_string(tmp.path().join("category-20/_index.md")).unwrap();
        assert!(fallback.contains("title: category-20\n"));

        let image = std::fs::read(tmp.path().join("images/docking-procedures-1.png")).unwrap();
        assert_eq!(image, b"PNGDATA");
    }

    #[tokio::test]
    async fn missing_knowledge_base_is_a_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/knowledge_bases/1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let err = run_export(&mut ctx, &SilentProgress).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("kb_id"));
    }

    #[tokio::test]
    async fn rejected_token_stays_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/knowledge_bases/1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let err = run_export(&mut ctx, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, MirrorError::Auth(_)));
    }

    #[tokio::test]
    async fn looping_child_links_terminate() {
        let server = MockServer::start().await;

        mount_kb(&server, json!([10, 11])).await;
        // 10 and 11 list each other as children
        mount_category(&server, 10, json!(null), json!([]), json!([]), json!([11])).await;
        mount_category(&server, 11, json!(10), json!([]), json!([]), json!([10])).await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let summary = run_export(&mut ctx, &SilentProgress).await.unwrap();
        assert_eq!(summary.categories, 2);
    }

    #[tokio::test]
    async fn damaged_parent_chain_skips_only_that_subtree() {
        let server = MockServer::start().await;

        mount_kb(&server, json!([13, 14, 15])).await;
        mount_category(&server, 13, json!(null), json!([]), json!([]), json!([14])).await;
        // 14's ancestry loops through 15 and back
        mount_category(&server, 14, json!(15), json!([]), json!([]), json!([])).await;
        mount_category(&server, 15, json!(14), json!([]), json!([]), json!([])).await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let summary = run_export(&mut ctx, &SilentProgress).await.unwrap();

        // The healthy root is written; the damaged branch is dropped
        assert_eq!(summary.categories, 1);
        assert!(tmp.path().join("category-13/_index.md").exists());
    }

    #[tokio::test]
    async fn unreachable_category_costs_only_itself() {
        let server = MockServer::start().await;

        mount_kb(&server, json!([10, 99])).await;
        mount_category(&server, 10, json!(null), json!([]), json!([]), json!([])).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/knowledge_bases/1/categories/99"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let summary = run_export(&mut ctx, &SilentProgress).await.unwrap();
        assert_eq!(summary.categories, 1);
    }
}
