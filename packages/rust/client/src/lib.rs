//! Authenticated Zammad REST client.
//!
//! All remote access goes through [`ZammadClient`]: token auth on every
//! request, a politeness delay after every request, and a single place where
//! HTTP statuses become [`MirrorError`] variants. Requests are strictly
//! sequential; the exporter never fetches concurrently.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use kbmirror_shared::{Category, KnowledgeBase, MirrorError, Result};

pub mod assets;

pub use assets::{AnswerContent, AnswerEnvelope, AnswerTranslation, AssetBundle, CategoryTranslation};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("kbmirror/", env!("CARGO_PKG_VERSION"));

/// Records per page for paginated collection endpoints.
const PAGE_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// A downloaded attachment body with its advertised content type.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    /// Raw `Content-Type` header value, if the server sent one.
    pub content_type: Option<String>,
}

// ---------------------------------------------------------------------------
// ZammadClient
// ---------------------------------------------------------------------------

/// HTTP client for the Zammad REST API (`{base}/api/v1`).
pub struct ZammadClient {
    http: Client,
    /// Base URL with no trailing slash.
    base: String,
    rate_limit: Duration,
    page_size: usize,
}

impl ZammadClient {
    /// Create a client for `base_url` authenticating with `token`.
    ///
    /// `rate_limit_ms` is slept after every request, keeping the mirror
    /// polite to production helpdesk instances.
    pub fn new(base_url: &str, token: &str, rate_limit_ms: u64) -> Result<Self> {
        let base = base_url.trim_end_matches('/').to_string();

        let mut auth = HeaderValue::from_str(&format!("Token token={token}"))
            .map_err(|e| MirrorError::config(format!("token is not a valid header value: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MirrorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            rate_limit: Duration::from_millis(rate_limit_ms),
            page_size: PAGE_SIZE,
        })
    }

    /// Shrink the pagination page size (for integration tests).
    #[cfg(test)]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Issue a GET against `/api/v1{path}` and map the status.
    ///
    /// The politeness sleep happens before the status check so that even
    /// rejected requests count toward the rate limit.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}/api/v1{}", self.base, path);
        debug!(%url, "api request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MirrorError::Network(format!("{url}: {e}")))?;

        if !self.rate_limit.is_zero() {
            tokio::time::sleep(self.rate_limit).await;
        }

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(MirrorError::Auth(
                "the API token was rejected; check the token and its expiry".into(),
            )),
            StatusCode::FORBIDDEN => Err(MirrorError::Forbidden {
                path: path.to_string(),
            }),
            status if !status.is_success() => Err(MirrorError::Http {
                status: status.as_u16(),
                path: path.to_string(),
            }),
            _ => Ok(response),
        }
    }

    /// GET a JSON document and deserialize it.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.get(path, query).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| MirrorError::decode(format!("{path}: {e}")))
    }

    // -----------------------------------------------------------------------
    // Knowledge base endpoints
    // -----------------------------------------------------------------------

    /// Fetch the root knowledge base record.
    pub async fn knowledge_base(&self, kb_id: u64) -> Result<KnowledgeBase> {
        self.get_json(&format!("/knowledge_bases/{kb_id}"), &[]).await
    }

    /// Fetch one category.
    pub async fn category(&self, kb_id: u64, category_id: u64) -> Result<Category> {
        self.get_json(&format!("/knowledge_bases/{kb_id}/categories/{category_id}"), &[])
            .await
    }

    /// Fetch an answer's metadata envelope (step 1: no body HTML).
    pub async fn answer(&self, kb_id: u64, answer_id: u64) -> Result<AnswerEnvelope> {
        self.get_json(&format!("/knowledge_bases/{kb_id}/answers/{answer_id}"), &[])
            .await
    }

    /// Fetch an answer envelope including the body HTML for one translation
    /// (step 2). Zammad withholds bodies unless `include_contents` names the
    /// translation explicitly.
    pub async fn answer_with_contents(
        &self,
        kb_id: u64,
        answer_id: u64,
        translation_id: u64,
    ) -> Result<AnswerEnvelope> {
        self.get_json(
            &format!("/knowledge_bases/{kb_id}/answers/{answer_id}"),
            &[("include_contents", translation_id.to_string())],
        )
        .await
    }

    /// Fetch tags for any taggable object via the polymorphic tag endpoint.
    ///
    /// The `tags` field embedded on answer assets is permanently empty; tags
    /// live in their own table and must be fetched here. Requires the
    /// `admin.tag` permission (or an Agent role) on some Zammad versions —
    /// callers handle the resulting [`MirrorError::Forbidden`].
    pub async fn tags(&self, object: &str, object_id: u64) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct TagsResponse {
            #[serde(default)]
            tags: Vec<String>,
        }

        let response: TagsResponse = self
            .get_json(
                "/tags",
                &[
                    ("object", object.to_string()),
                    ("o_id", object_id.to_string()),
                ],
            )
            .await?;
        Ok(response.tags)
    }

    /// Download an attachment body.
    pub async fn fetch_attachment(&self, attachment_id: u64) -> Result<Attachment> {
        let response = self.get(&format!("/attachments/{attachment_id}"), &[]).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| {
                MirrorError::Network(format!("attachment {attachment_id}: body read failed: {e}"))
            })?
            .to_vec();

        Ok(Attachment { bytes, content_type })
    }

    // -----------------------------------------------------------------------
    // Pagination
    // -----------------------------------------------------------------------

    /// Fetch every record from a paginated collection endpoint.
    ///
    /// Pages from 1 with `page`/`per_page`/`expand=true` until an empty or
    /// short page. A mid-stream recoverable error ends the walk with a
    /// warning and returns the records fetched so far; fatal errors
    /// propagate. `label` names the collection in logs.
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        label: &str,
    ) -> Result<Vec<T>> {
        let mut records: Vec<T> = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("page", page.to_string()),
                ("per_page", self.page_size.to_string()),
                ("expand", "true".to_string()),
            ];

            let batch: Vec<T> = match self.get_json(path, &query).await {
                Ok(batch) => batch,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        label,
                        fetched = records.len(),
                        error = %e,
                        "paginated fetch failed; returning partial results"
                    );
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }
            let short_page = batch.len() < self.page_size;
            records.extend(batch);
            if short_page {
                break;
            }
            page += 1;
        }

        debug!(label, count = records.len(), "paginated fetch complete");
        Ok(records)
    }
}
