//! Generic strategy backed by an external URL-to-markdown reader service.
//!
//! The target URL is appended to the reader's base URL and fetched with a
//! single GET; the response body is used as the page text. With
//! `direct_fallback` set, a failed reader call is followed by one direct GET
//! of the page, whose main content block is scraped instead.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument, warn};
use url::Url;

use linkpub_shared::{ExtractedContent, LinkPubError, ReaderConfig, Result, SourceType};

use super::ExtractStrategy;
use crate::text::{self, ReaderDocument};
use crate::{USER_AGENT, transport_error};

pub struct ReaderStrategy {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    direct_fallback: bool,
}

impl ReaderStrategy {
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LinkPubError::config(format!("failed to build HTTP client: {e}")))?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            direct_fallback: config.direct_fallback,
        })
    }

    /// Reader endpoint for `url`, without doubling an existing reader prefix.
    fn endpoint(&self, url: &Url) -> String {
        let target = url.as_str();
        let target = target.strip_prefix(self.base_url.as_str()).unwrap_or(target);
        format!("{}{target}", self.base_url)
    }

    async fn via_reader(&self, url: &Url) -> Result<ExtractedContent> {
        let endpoint = self.endpoint(url);
        debug!(%endpoint, keyed = self.api_key.is_some(), "requesting reader");

        let mut request = self.client.get(&endpoint);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let body = self.fetch_text(url, request).await?;

        let doc = ReaderDocument::parse(&body);
        let body_text = text::strip_markdown_links(&doc.body);
        if body_text.is_empty() {
            return Err(LinkPubError::EmptyContent {
                url: url.to_string(),
            });
        }

        let title = doc
            .title
            .clone()
            .or_else(|| text::first_heading(&doc.body))
            .or_else(|| text::html_title(&body))
            .unwrap_or_else(|| text::title_from_url(url));

        let raw: BTreeMap<String, serde_json::Value> = doc
            .headers
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        debug!(%title, chars = body_text.chars().count(), "reader extraction complete");
        Ok(webpage(url, title, body_text, raw))
    }

    async fn direct(&self, url: &Url) -> Result<ExtractedContent> {
        let request = self
            .client
            .get(url.as_str())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8");
        let html = self.fetch_text(url, request).await?;

        let page = text::html_page(&html);
        if page.text.is_empty() {
            return Err(LinkPubError::EmptyContent {
                url: url.to_string(),
            });
        }
        let title = page.title.unwrap_or_else(|| text::title_from_url(url));

        let mut raw = BTreeMap::new();
        raw.insert("fetched_via".to_string(), serde_json::json!("direct"));

        debug!(%title, chars = page.text.chars().count(), "direct extraction complete");
        Ok(webpage(url, title, page.text, raw))
    }

    /// Send `request` and return the body of a 2xx response.
    async fn fetch_text(&self, url: &Url, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request.send().await.map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkPubError::fetch(url.as_str(), format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| LinkPubError::fetch(url.as_str(), format!("body read failed: {e}")))
    }
}

fn webpage(
    url: &Url,
    title: String,
    body_text: String,
    raw: BTreeMap<String, serde_json::Value>,
) -> ExtractedContent {
    ExtractedContent {
        url: url.to_string(),
        title,
        body_text,
        author: None,
        source_type: SourceType::Webpage,
        raw,
    }
}

#[async_trait]
impl ExtractStrategy for ReaderStrategy {
    #[instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url) -> Result<ExtractedContent> {
        let reader_err = match self.via_reader(url).await {
            Ok(content) => return Ok(content),
            Err(e) if self.direct_fallback => e,
            Err(e) => return Err(e),
        };

        warn!(error = %reader_err, "reader failed; fetching page directly");
        self.direct(url).await.map_err(|direct_err| {
            LinkPubError::fetch(
                url.as_str(),
                format!("reader: {reader_err}; direct: {direct_err}"),
            )
        })
    }

    fn name(&self) -> &str {
        "reader"
    }
}
