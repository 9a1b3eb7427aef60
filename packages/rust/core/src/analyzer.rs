//! The analysis seam.
//!
//! Summarizing and classifying content is done by an external collaborator
//! behind [`Analyzer`]. [`ManualAnalyzer`] takes caller-supplied values
//! (CLI flags or an analyses file) and fills the gaps from the content.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use linkpub_cover::auto_select_style;
use linkpub_shared::{
    AnalysisResult, Category, CategorySet, CoverStyle, ExtractedContent, LinkPubError, Result,
};

/// Characters of body text used for a heuristic summary.
const SUMMARY_PREFIX_CHARS: usize = 200;

/// Style used when a supplied style key is not recognised.
const FALLBACK_STYLE: CoverStyle = CoverStyle::Tech;

/// Turns extracted content into a validated [`AnalysisResult`].
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, content: &ExtractedContent) -> Result<AnalysisResult>;
}

/// Caller-supplied analysis values; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, alias = "style")]
    pub cover_style: Option<String>,
    #[serde(default)]
    pub score: Option<u32>,
}

impl AnalysisOverride {
    /// Fill unset fields from `fallback`.
    fn or(&self, fallback: &AnalysisOverride) -> AnalysisOverride {
        AnalysisOverride {
            url: self.url.clone(),
            title: self.title.clone().or_else(|| fallback.title.clone()),
            summary: self.summary.clone().or_else(|| fallback.summary.clone()),
            categories: if self.categories.is_empty() {
                fallback.categories.clone()
            } else {
                self.categories.clone()
            },
            cover_style: self.cover_style.clone().or_else(|| fallback.cover_style.clone()),
            score: self.score.or(fallback.score),
        }
    }
}

/// Read an analyses file: a JSON array of [`AnalysisOverride`] objects.
pub fn load_analyses(path: &Path) -> Result<Vec<AnalysisOverride>> {
    let text = std::fs::read_to_string(path).map_err(|e| LinkPubError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        LinkPubError::analysis(format!("failed to parse analyses file {}: {e}", path.display()))
    })
}

/// Analyzer backed by explicit overrides plus content heuristics.
#[derive(Debug, Default)]
pub struct ManualAnalyzer {
    defaults: AnalysisOverride,
    by_url: HashMap<String, AnalysisOverride>,
}

impl ManualAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values applied to every URL unless a per-URL override sets them.
    pub fn with_defaults(mut self, defaults: AnalysisOverride) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_override(mut self, url: &str, analysis: AnalysisOverride) -> Self {
        self.by_url.insert(normalize(url), analysis);
        self
    }

    /// Pair analyses-file entries with URLs: by their `url` field when set,
    /// otherwise by position.
    pub fn from_entries(urls: &[String], entries: Vec<AnalysisOverride>) -> Self {
        let mut analyzer = Self::new();
        for (idx, entry) in entries.into_iter().enumerate() {
            let key = match (&entry.url, urls.get(idx)) {
                (Some(url), _) => url.clone(),
                (None, Some(url)) => url.clone(),
                (None, None) => {
                    warn!(index = idx, "analysis entry has no matching URL; ignored");
                    continue;
                }
            };
            analyzer = analyzer.with_override(&key, entry);
        }
        analyzer
    }

    fn resolve(&self, url: &str) -> AnalysisOverride {
        match self.by_url.get(&normalize(url)) {
            Some(specific) => specific.or(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

#[async_trait]
impl Analyzer for ManualAnalyzer {
    async fn analyze(&self, content: &ExtractedContent) -> Result<AnalysisResult> {
        let supplied = self.resolve(&content.url);

        let title = supplied
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| fallback_title(content));
        let summary = supplied
            .summary
            .unwrap_or_else(|| summary_prefix(&content.body_text));

        let categories = if supplied.categories.is_empty() {
            CategorySet::single(Category::Other)
        } else {
            CategorySet::parse(&supplied.categories)?
        };

        let style = match supplied.cover_style.as_deref() {
            Some(key) => key.parse().unwrap_or_else(|_| {
                warn!(
                    style = key,
                    fallback = %FALLBACK_STYLE,
                    "unknown cover style; using fallback"
                );
                FALLBACK_STYLE
            }),
            None => auto_select_style(&title, categories.as_slice()),
        };

        debug!(%title, %style, categories = ?categories.labels(), "analysis resolved");
        AnalysisResult::new(
            title,
            summary,
            &categories.labels(),
            supplied.score.unwrap_or(0),
            style.as_str(),
        )
    }
}

/// Content title, else the host, else the first 50 characters of the URL.
fn fallback_title(content: &ExtractedContent) -> String {
    if !content.title.trim().is_empty() {
        return content.title.trim().to_string();
    }
    Url::parse(&content.url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| content.url.chars().take(50).collect())
}

fn summary_prefix(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= SUMMARY_PREFIX_CHARS {
        return body.to_string();
    }
    let prefix: String = body.chars().take(SUMMARY_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

fn normalize(url: &str) -> String {
    Url::parse(url.trim())
        .map(String::from)
        .unwrap_or_else(|_| url.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpub_shared::{ErrorKind, SourceType};
    use std::collections::BTreeMap;

    fn content(url: &str, title: &str, body: &str) -> ExtractedContent {
        ExtractedContent {
            url: url.into(),
            title: title.into(),
            body_text: body.into(),
            author: None,
            source_type: SourceType::Webpage,
            raw: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn heuristics_fill_everything() {
        let body = "字".repeat(250);
        let result = ManualAnalyzer::new()
            .analyze(&content("https://example.com/a", "年度科技报告", &body))
            .await
            .unwrap();

        assert_eq!(result.title, "年度科技报告");
        assert_eq!(result.summary.chars().count(), SUMMARY_PREFIX_CHARS + 3);
        assert!(result.summary.ends_with("..."));
        assert_eq!(result.categories.as_slice(), &[Category::Other]);
        assert_eq!(result.cover_style, CoverStyle::Tech);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn per_url_override_beats_defaults() {
        let analyzer = ManualAnalyzer::new()
            .with_defaults(AnalysisOverride {
                summary: Some("default summary".into()),
                categories: vec!["行业资讯".into()],
                ..Default::default()
            })
            .with_override(
                "https://example.com",
                AnalysisOverride {
                    title: Some("Custom".into()),
                    categories: vec!["开源项目".into(), "AI工具".into()],
                    cover_style: Some("geek".into()),
                    score: Some(88),
                    ..Default::default()
                },
            );

        // Extracted URLs are normalized with a trailing slash.
        let result = analyzer
            .analyze(&content("https://example.com/", "Page", "body"))
            .await
            .unwrap();
        assert_eq!(result.title, "Custom");
        assert_eq!(result.summary, "default summary");
        assert_eq!(result.categories.labels(), vec!["开源项目", "AI工具"]);
        assert_eq!(result.cover_style, CoverStyle::Geek);
        assert_eq!(result.score, 88);
    }

    #[tokio::test]
    async fn invalid_categories_are_rejected() {
        for cats in [
            vec!["不存在的类别"],
            vec!["技术文档", "开源项目", "AI工具", "其他"],
        ] {
            let analyzer = ManualAnalyzer::new().with_defaults(AnalysisOverride {
                categories: cats.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            });
            let err = analyzer
                .analyze(&content("https://example.com/x", "T", "b"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAnalysis);
        }
    }

    #[tokio::test]
    async fn unknown_style_falls_back() {
        let analyzer = ManualAnalyzer::new().with_defaults(AnalysisOverride {
            cover_style: Some("vaporwave".into()),
            ..Default::default()
        });
        let result = analyzer
            .analyze(&content("https://example.com/x", "T", "b"))
            .await
            .unwrap();
        assert_eq!(result.cover_style, CoverStyle::Tech);
    }

    #[tokio::test]
    async fn empty_title_uses_host() {
        let result = ManualAnalyzer::new()
            .analyze(&content("https://news.example.org/p/1", "", ""))
            .await
            .unwrap();
        assert_eq!(result.title, "news.example.org");
        assert_eq!(result.summary, "");
    }

    #[test]
    fn entries_pair_by_url_or_position() {
        let urls = vec!["https://a.dev/1".to_string(), "https://b.dev/2".to_string()];
        let entries = vec![
            AnalysisOverride {
                title: Some("first".into()),
                ..Default::default()
            },
            AnalysisOverride {
                url: Some("https://a.dev/1".into()),
                summary: Some("by url".into()),
                ..Default::default()
            },
        ];
        let analyzer = ManualAnalyzer::from_entries(&urls, entries);

        // The url-keyed entry replaces the positional one for a.dev.
        let a = analyzer.resolve("https://a.dev/1");
        assert_eq!(a.summary.as_deref(), Some("by url"));
        assert!(analyzer.resolve("https://b.dev/2").title.is_none());
    }

    #[test]
    fn analyses_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.json");
        std::fs::write(
            &path,
            r#"[{"title": "T", "summary": "S", "categories": ["技术文档"],
                 "style": "swiss", "score": 70}]"#,
        )
        .unwrap();

        let entries = load_analyses(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cover_style.as_deref(), Some("swiss"));
        assert_eq!(entries[0].score, Some(70));
    }
}
