//! Core domain types shared by every stage of the link pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, LinkPubError, Result};

/// Subtitle rendered under the title when the caller does not supply one.
pub const DEFAULT_SUBTITLE: &str = "精选内容·建议收藏";

/// Maximum number of categories per record.
pub const MAX_CATEGORIES: usize = 3;

/// Longest title the link table stores.
pub const MAX_TITLE_CHARS: usize = 50;

/// Longest summary the link table stores.
pub const MAX_SUMMARY_CHARS: usize = 150;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The fixed category enumeration of the link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "技术文档")]
    TechDocs,
    #[serde(rename = "开源项目")]
    OpenSource,
    #[serde(rename = "AI工具")]
    AiTools,
    #[serde(rename = "产品设计")]
    ProductDesign,
    #[serde(rename = "行业资讯")]
    IndustryNews,
    #[serde(rename = "学习教程")]
    Tutorial,
    #[serde(rename = "效率工具")]
    Productivity,
    #[serde(rename = "观点思考")]
    Opinion,
    #[serde(rename = "其他")]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::TechDocs,
        Self::OpenSource,
        Self::AiTools,
        Self::ProductDesign,
        Self::IndustryNews,
        Self::Tutorial,
        Self::Productivity,
        Self::Opinion,
        Self::Other,
    ];

    /// Label as stored in the table's multi-select options.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TechDocs => "技术文档",
            Self::OpenSource => "开源项目",
            Self::AiTools => "AI工具",
            Self::ProductDesign => "产品设计",
            Self::IndustryNews => "行业资讯",
            Self::Tutorial => "学习教程",
            Self::Productivity => "效率工具",
            Self::Opinion => "观点思考",
            Self::Other => "其他",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = LinkPubError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label() == s)
            .ok_or_else(|| LinkPubError::analysis(format!("unknown category '{s}'")))
    }
}

/// Ordered, duplicate-free set of 1–3 categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Category>", into = "Vec<Category>")]
pub struct CategorySet(Vec<Category>);

impl CategorySet {
    /// Validate size and uniqueness, keeping the caller's order.
    pub fn new(categories: Vec<Category>) -> Result<Self> {
        if categories.is_empty() {
            return Err(LinkPubError::analysis("at least one category is required"));
        }
        if categories.len() > MAX_CATEGORIES {
            return Err(LinkPubError::analysis(format!(
                "at most {MAX_CATEGORIES} categories allowed, got {}",
                categories.len()
            )));
        }
        for (i, c) in categories.iter().enumerate() {
            if categories[..i].contains(c) {
                return Err(LinkPubError::analysis(format!("duplicate category '{c}'")));
            }
        }
        Ok(Self(categories))
    }

    /// Parse labels such as `["技术文档", "AI工具"]`.
    pub fn parse<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let categories = labels
            .iter()
            .map(|l| l.as_ref().parse())
            .collect::<Result<Vec<Category>>>()?;
        Self::new(categories)
    }

    pub fn single(category: Category) -> Self {
        Self(vec![category])
    }

    pub fn as_slice(&self) -> &[Category] {
        &self.0
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.0.iter().map(Category::label).collect()
    }
}

impl TryFrom<Vec<Category>> for CategorySet {
    type Error = LinkPubError;

    fn try_from(value: Vec<Category>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CategorySet> for Vec<Category> {
    fn from(set: CategorySet) -> Self {
        set.0
    }
}

// ---------------------------------------------------------------------------
// CoverStyle
// ---------------------------------------------------------------------------

/// The twelve cover styles understood by the render tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverStyle {
    Swiss,
    Acid,
    Pop,
    Shock,
    Diffuse,
    Sticker,
    Journal,
    Cinema,
    Tech,
    Minimal,
    Memo,
    Geek,
}

impl CoverStyle {
    pub const ALL: [CoverStyle; 12] = [
        Self::Swiss,
        Self::Acid,
        Self::Pop,
        Self::Shock,
        Self::Diffuse,
        Self::Sticker,
        Self::Journal,
        Self::Cinema,
        Self::Tech,
        Self::Minimal,
        Self::Memo,
        Self::Geek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swiss => "swiss",
            Self::Acid => "acid",
            Self::Pop => "pop",
            Self::Shock => "shock",
            Self::Diffuse => "diffuse",
            Self::Sticker => "sticker",
            Self::Journal => "journal",
            Self::Cinema => "cinema",
            Self::Tech => "tech",
            Self::Minimal => "minimal",
            Self::Memo => "memo",
            Self::Geek => "geek",
        }
    }
}

impl std::fmt::Display for CoverStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverStyle {
    type Err = LinkPubError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == key)
            .ok_or_else(|| LinkPubError::InvalidStyle(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Kind of source a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Webpage,
    Github,
    Article,
    Wechat,
}

/// Caller's hint for which extraction strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    #[default]
    Auto,
    Webpage,
    Github,
    Wechat,
    Article,
}

impl FromStr for TypeHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "webpage" => Ok(Self::Webpage),
            "github" => Ok(Self::Github),
            "wechat" => Ok(Self::Wechat),
            "article" => Ok(Self::Article),
            other => Err(format!(
                "unknown type '{other}': expected auto, webpage, github, wechat or article"
            )),
        }
    }
}

/// Normalized content returned by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// The URL that was extracted.
    pub url: String,
    pub title: String,
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub source_type: SourceType,
    /// Strategy-specific metadata (stars, publish time, nickname, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Validated output of the analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub title: String,
    pub summary: String,
    pub categories: CategorySet,
    pub score: u8,
    pub cover_style: CoverStyle,
}

impl AnalysisResult {
    /// Build a result from loosely-typed input, rejecting anything outside the
    /// fixed category and style enumerations.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        categories: &[impl AsRef<str>],
        score: u32,
        cover_style: &str,
    ) -> Result<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LinkPubError::analysis("title must not be empty"));
        }
        if score > 100 {
            return Err(LinkPubError::analysis(format!(
                "score must be within 0..=100, got {score}"
            )));
        }
        let cover_style = cover_style
            .parse()
            .map_err(|_| LinkPubError::analysis(format!("unknown cover style '{cover_style}'")))?;

        Ok(Self {
            title,
            summary: summary.into(),
            categories: CategorySet::parse(categories)?,
            score: score as u8,
            cover_style,
        })
    }
}

// ---------------------------------------------------------------------------
// Records and covers
// ---------------------------------------------------------------------------

/// One row destined for the link table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source_url: String,
    pub title: String,
    pub summary: String,
    pub categories: CategorySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharer: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<PathBuf>,
}

impl LinkRecord {
    /// Cut title and summary to the table limits. Returns one note per cut;
    /// a record that already fits is left untouched.
    pub fn fit_to_limits(&mut self) -> Vec<String> {
        let mut notes = Vec::new();
        let (title, cut) = truncate_chars(&self.title, MAX_TITLE_CHARS);
        if cut {
            tracing::warn!(max = MAX_TITLE_CHARS, "title truncated");
            notes.push(format!("title truncated to {MAX_TITLE_CHARS} characters"));
            self.title = title;
        }
        let (summary, cut) = truncate_chars(&self.summary, MAX_SUMMARY_CHARS);
        if cut {
            tracing::warn!(max = MAX_SUMMARY_CHARS, "summary truncated");
            notes.push(format!("summary truncated to {MAX_SUMMARY_CHARS} characters"));
            self.summary = summary;
        }
        notes
    }
}

/// Inputs for a single cover render.
#[derive(Debug, Clone)]
pub struct CoverSpec {
    pub title: String,
    pub subtitle: String,
    /// Unvalidated style key; the generator rejects unknown keys.
    pub style: String,
    pub output_dir: PathBuf,
    /// Explicit file name; a collision-free one is generated when absent.
    pub file_name: Option<String>,
}

impl CoverSpec {
    pub fn new(
        title: impl Into<String>,
        style: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            title: title.into(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            style: style.into(),
            output_dir: output_dir.into(),
            file_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run outcomes
// ---------------------------------------------------------------------------

/// Pipeline stage a URL reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Extracting,
    Analyzing,
    CoverGenerating,
    Publishing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

/// Error kind and message attached to a failed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LinkPubError> for OutcomeError {
    fn from(err: &LinkPubError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Per-URL result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub url: String,
    pub status: OutcomeStatus,
    /// Last stage entered; for failures, the stage that failed.
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    /// The record that was (or, in a dry run, would have been) published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<LinkRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Non-fatal degradations (cover skipped, text truncated, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Truncate to at most `max` characters, marking the cut with `…`.
///
/// Returns the input unchanged (and `false`) when it already fits.
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        return (text.to_string(), false);
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    (format!("{kept}…"), true)
}
