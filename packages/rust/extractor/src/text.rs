//! Text helpers: reader-response parsing, markdown link stripping and title
//! fallbacks.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+?)\s*#*\s*$").expect("valid regex"));

/// Marker line separating the reader's metadata header from the page body.
const CONTENT_MARKER: &str = "Markdown Content:";

/// A reader response split into its metadata header and markdown body.
#[derive(Debug, Default)]
pub(crate) struct ReaderDocument {
    pub title: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ReaderDocument {
    /// Split `Title: ...` / `URL Source: ...` headers from the body.
    ///
    /// Responses without the header block are treated as pure body text.
    pub fn parse(response: &str) -> Self {
        let response = response.trim_start_matches('\u{feff}').trim();

        let Some(marker) = response.find(CONTENT_MARKER) else {
            return Self {
                body: response.to_string(),
                ..Self::default()
            };
        };

        let mut headers = BTreeMap::new();
        for line in response[..marker].lines() {
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                if !key.trim().is_empty() && !value.is_empty() {
                    headers.insert(key.trim().to_string(), value.to_string());
                }
            }
        }

        Self {
            title: headers.remove("Title"),
            headers,
            body: response[marker + CONTENT_MARKER.len()..].trim().to_string(),
        }
    }
}

/// Drop images and reduce links to their anchor text.
pub(crate) fn strip_markdown_links(markdown: &str) -> String {
    let text = IMAGE_RE.replace_all(markdown, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// First markdown heading of any level.
pub(crate) fn first_heading(markdown: &str) -> Option<String> {
    HEADING_RE
        .captures(markdown)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `<title>` of an HTML document, if the text looks like HTML at all.
pub(crate) fn html_title(text: &str) -> Option<String> {
    if !text.contains("<title") {
        return None;
    }
    let doc = Html::parse_document(text);
    let sel = Selector::parse("title").expect("valid selector");
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Containers tried in order when scraping a page directly.
const MAIN_CONTAINERS: [&str; 6] = [
    "main",
    "article",
    r#"div[class*="content"]"#,
    r#"div[class*="main"]"#,
    r#"div[class*="article"]"#,
    "body",
];

/// Elements whose text never counts as page content.
const SKIPPED_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "aside"];

/// Title and main text scraped from a raw HTML page.
#[derive(Debug, Default)]
pub(crate) struct HtmlPage {
    pub title: Option<String>,
    pub text: String,
}

/// Scrape the `<title>` and the text of the first main-content container.
pub(crate) fn html_page(html: &str) -> HtmlPage {
    let doc = Html::parse_document(html);
    let text = MAIN_CONTAINERS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next())
        .map(visible_text)
        .unwrap_or_default();

    HtmlPage {
        title: html_title(html),
        text,
    }
}

/// Text nodes under `root`, one trimmed line each, skipping chrome elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_TAGS.contains(&el.value().name()));
        let text = text.trim();
        if !hidden && !text.is_empty() {
            lines.push(text.to_string());
        }
    }
    lines.join("\n")
}

/// Last non-empty path segment, or the host for bare domains.
pub(crate) fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            s.trim_end_matches(".html")
                .trim_end_matches(".htm")
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.host_str().unwrap_or(url.as_str()).to_string())
}
