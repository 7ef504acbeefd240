//! Attachment download and `<img src>` rewriting.
//!
//! Answer bodies reference embedded images through the Zammad attachment
//! API (`/api/v1/attachments/{id}`, relative or absolute). Each referenced
//! attachment is downloaded into the flat `images/` directory and the src
//! is rewritten to a relative path so the exported tree works offline.
//!
//! Filenames are `{answer-slug}-{n}.{ext}` with a 1-based per-answer
//! counter. The extension comes from the response Content-Type, never from
//! Content-Disposition: Zammad sends RFC 6266 encoded filenames there,
//! which are not safe to reuse directly.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::context::ExportContext;

/// Matches an img tag whose src points at the attachment API, capturing
/// the tag prefix, the full src value, the attachment id, and the closing
/// quote. Handles both relative and absolute src values.
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<img\b[^>]*?\bsrc=")([^"]*?/api/v1/attachments/(\d+)[^"]*)(")"#)
        .expect("valid regex")
});

struct ImageRef {
    src_range: Range<usize>,
    attachment_id: u64,
}

impl ExportContext {
    /// Download every attachment referenced by the HTML body and rewrite
    /// each src to a relative path into `images/`.
    ///
    /// `depth` is the number of category folders between the answer file
    /// and the output root; it becomes the `../` prefix. A failed download
    /// leaves the original src in place so no content is silently lost.
    pub(crate) async fn rewrite_images(
        &mut self,
        html: &str,
        answer_slug: &str,
        depth: usize,
    ) -> String {
        let refs: Vec<ImageRef> = IMG_SRC_RE
            .captures_iter(html)
            .filter_map(|caps| {
                let src = caps.get(2)?;
                let attachment_id = caps.get(3)?.as_str().parse().ok()?;
                Some(ImageRef {
                    src_range: src.range(),
                    attachment_id,
                })
            })
            .collect();

        if refs.is_empty() {
            return html.to_string();
        }

        let up = "../".repeat(depth);
        let mut replacements: Vec<(Range<usize>, String)> = Vec::new();

        // The counter advances for every reference, downloaded or not, so
        // the numbering of the surviving images stays stable.
        for (i, image_ref) in refs.iter().enumerate() {
            let n = i + 1;
            if let Some(filename) = self
                .materialize_attachment(image_ref.attachment_id, answer_slug, n)
                .await
            {
                replacements.push((
                    image_ref.src_range.clone(),
                    format!("{up}images/{filename}"),
                ));
            }
        }

        // Splice back to front so earlier byte ranges stay valid
        let mut result = html.to_string();
        for (range, new_src) in replacements.into_iter().rev() {
            result.replace_range(range, &new_src);
        }
        result
    }

    /// Download one attachment to `images/` and return its filename, or
    /// `None` on any failure.
    ///
    /// Every failure here is soft, including auth failures: the attachment
    /// endpoint sits outside the knowledge base permission model and a 401
    /// on it must not kill an export that is otherwise working.
    async fn materialize_attachment(
        &mut self,
        attachment_id: u64,
        answer_slug: &str,
        n: usize,
    ) -> Option<String> {
        if let Some(filename) = self.images.get(&attachment_id) {
            return Some(filename.clone());
        }

        let attachment = match self.client.fetch_attachment(attachment_id).await {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(attachment_id, error = %e, "attachment download failed; leaving src unchanged");
                return None;
            }
        };

        let ext = ext_for_content_type(attachment.content_type.as_deref());
        let filename = format!("{answer_slug}-{n}.{ext}");

        let images_dir = self.out.images_dir();
        if let Err(e) = std::fs::create_dir_all(&images_dir) {
            warn!(attachment_id, error = %e, "could not create images directory");
            return None;
        }

        let dest = images_dir.join(&filename);
        if !dest.exists() {
            if let Err(e) = std::fs::write(&dest, &attachment.bytes) {
                warn!(attachment_id, path = %dest.display(), error = %e, "could not write image");
                return None;
            }
            let shown = format!("images/{filename}");
            info!(path = %shown, "image downloaded");
        }

        self.images.insert(attachment_id, filename.clone());
        Some(filename)
    }
}

/// Map a Content-Type header to a file extension.
///
/// Known image subtypes get canonical extensions; an unknown subtype is
/// used as-is when it is plain alphanumeric, and anything else (missing
/// header, `octet-stream`, parameters only) becomes `bin`.
fn ext_for_content_type(content_type: Option<&str>) -> String {
    let subtype = content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match subtype.as_str() {
        "jpeg" | "jpg" => "jpg".into(),
        "png" => "png".into(),
        "gif" => "gif".into(),
        "webp" => "webp".into(),
        "svg+xml" => "svg".into(),
        "bmp" => "bmp".into(),
        "tiff" => "tiff".into(),
        _ if !subtype.is_empty()
            && subtype
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) =>
        {
            subtype
        }
        _ => "bin".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kbmirror_client::ZammadClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context_for(server_uri: &str, out_root: &std::path::Path) -> ExportContext {
        let client = ZammadClient::new(server_uri, "test-token", 0).unwrap();
        ExportContext::new(client, 1, out_root, true)
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(ext_for_content_type(Some("image/png")), "png");
        assert_eq!(ext_for_content_type(Some("image/jpeg")), "jpg");
        assert_eq!(ext_for_content_type(Some("image/svg+xml")), "svg");
        assert_eq!(ext_for_content_type(Some("image/jpeg; charset=binary")), "jpg");
        assert_eq!(ext_for_content_type(Some("application/pdf")), "pdf");
        assert_eq!(ext_for_content_type(Some("application/octet-stream")), "bin");
        assert_eq!(ext_for_content_type(None), "bin");
        assert_eq!(ext_for_content_type(Some("")), "bin");
    }

    #[test]
    fn regex_matches_relative_and_absolute_src() {
        let html = r#"<img src="/api/v1/attachments/46">
            <img alt="x" SRC="https://kb.example.com/api/v1/attachments/47?view=inline">
            <img src="https://elsewhere.example.com/logo.png">"#;

        let ids: Vec<u64> = IMG_SRC_RE
            .captures_iter(html)
            .map(|c| c[3].parse().unwrap())
            .collect();
        assert_eq!(ids, vec![46, 47]);
    }

    #[tokio::test]
    async fn rewrites_src_and_downloads_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/46"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"PNGDATA".to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        // The same attachment twice: second reference hits the cache
        let html = r#"<p><img src="/api/v1/attachments/46"></p>
<p><img src="/api/v1/attachments/46" alt="again"></p>"#;

        let rewritten = ctx.rewrite_images(html, "warp-core-fix", 0).await;

        assert_eq!(rewritten.matches(r#"src="images/warp-core-fix-1.png""#).count(), 2);
        let on_disk = std::fs::read(tmp.path().join("images/warp-core-fix-1.png")).unwrap();
        assert_eq!(on_disk, b"PNGDATA");
    }

    #[tokio::test]
    async fn sequence_numbers_follow_order_of_appearance() {
        let server = MockServer::start().await;
        for id in [80, 81, 82] {
            Mock::given(method("GET"))
                .and(path(format!("/api/v1/attachments/{id}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_raw(b"PNGDATA".to_vec(), "image/png"),
                )
                .mount(&server)
                .await;
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let html = r#"<img src="/api/v1/attachments/80"><img src="/api/v1/attachments/81"><img src="/api/v1/attachments/82">"#;
        let rewritten = ctx.rewrite_images(html, "warp-core-fix", 0).await;

        assert!(rewritten.contains(r#"src="images/warp-core-fix-1.png""#));
        assert!(rewritten.contains(r#"src="images/warp-core-fix-2.png""#));
        assert!(rewritten.contains(r#"src="images/warp-core-fix-3.png""#));
        assert!(tmp.path().join("images/warp-core-fix-3.png").exists());
    }

    #[tokio::test]
    async fn depth_builds_parent_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/9"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"GIF89a".to_vec(), "image/gif"))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let html = r#"<img src="/api/v1/attachments/9">"#;
        let rewritten = ctx.rewrite_images(html, "deep-answer", 2).await;

        assert!(rewritten.contains(r#"src="../../images/deep-answer-1.gif""#));
    }

    #[tokio::test]
    async fn failed_download_keeps_original_src_and_counter_slot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/50"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/51"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"JPG".to_vec(), "image/jpeg"))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let html = r#"<img src="/api/v1/attachments/50"><img src="/api/v1/attachments/51">"#;
        let rewritten = ctx.rewrite_images(html, "half-broken", 0).await;

        // First src untouched; second numbered 2, not 1
        assert!(rewritten.contains(r#"src="/api/v1/attachments/50""#));
        assert!(rewritten.contains(r#"src="images/half-broken-2.jpg""#));
        assert!(!tmp.path().join("images/half-broken-1.jpg").exists());
    }

    #[tokio::test]
    async fn auth_failure_on_attachment_is_soft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/60"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context_for(&server.uri(), tmp.path());

        let html = r#"<img src="/api/v1/attachments/60">"#;
        let rewritten = ctx.rewrite_images(html, "locked", 1).await;

        assert!(rewritten.contains(r#"src="/api/v1/attachments/60""#));
    }

    #[tokio::test]
    async fn existing_file_is_not_rewritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/70"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"NEW".to_vec(), "image/png"))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("images")).unwrap();
        std::fs::write(tmp.path().join("images/kept-1.png"), b"OLD").unwrap();

        let mut ctx = context_for(&server.uri(), tmp.path());
        let html = r#"<img src="/api/v1/attachments/70">"#;
        ctx.rewrite_images(html, "kept", 0).await;

        // Re-runs over an existing tree keep the bytes already on disk
        let on_disk = std::fs::read(tmp.path().join("images/kept-1.png")).unwrap();
        assert_eq!(on_disk, b"OLD");
    }
}
