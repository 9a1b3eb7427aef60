//! Error types for linkpub.
//!
//! Library crates use [`LinkPubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every variant maps onto an [`ErrorKind`], which is what a batch report
//! records for a failed URL.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable classification of a failure, shown in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidUrl,
    FetchFailed,
    EmptyContent,
    WechatUnavailable,
    InvalidAnalysis,
    InvalidStyle,
    RenderFailed,
    OutputMissing,
    SchemaMismatch,
    AuthFailed,
    PermissionDenied,
    NetworkFailed,
    PublishRejected,
    ConfigMissing,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "InvalidURL",
            Self::FetchFailed => "FetchFailed",
            Self::EmptyContent => "EmptyContent",
            Self::WechatUnavailable => "WechatUnavailable",
            Self::InvalidAnalysis => "InvalidAnalysis",
            Self::InvalidStyle => "InvalidStyle",
            Self::RenderFailed => "RenderFailed",
            Self::OutputMissing => "OutputMissing",
            Self::SchemaMismatch => "SchemaMismatch",
            Self::AuthFailed => "AuthFailed",
            Self::PermissionDenied => "PermissionDenied",
            Self::NetworkFailed => "NetworkFailed",
            Self::PublishRejected => "PublishRejected",
            Self::ConfigMissing => "ConfigMissing",
            Self::Config => "Config",
            Self::Io => "Io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for all linkpub operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkPubError {
    /// URL could not be parsed or uses an unsupported scheme.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network, timeout, or non-success HTTP status while fetching content.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The fetch succeeded but produced no usable text.
    #[error("no content retrieved from {url}")]
    EmptyContent { url: String },

    /// The WeChat article fetcher is disabled or was refused by the site.
    #[error("wechat article fetcher unavailable: {0}")]
    WechatUnavailable(String),

    /// Analysis result violates the category/style/score rules.
    #[error("invalid analysis: {message}")]
    InvalidAnalysis { message: String },

    /// Cover style is not one of the known keys.
    #[error("unknown cover style '{0}'")]
    InvalidStyle(String),

    /// The cover-render tool could not be started or exited non-zero.
    #[error("cover rendering failed: {0}")]
    RenderFailed(String),

    /// The cover-render tool reported success but left no file behind.
    #[error("cover tool exited successfully but {path:?} was not produced")]
    OutputMissing { path: PathBuf },

    /// The target table lacks expected fields or has them with the wrong type.
    #[error("table schema mismatch: {}", .problems.join("; "))]
    SchemaMismatch { problems: Vec<String> },

    /// Credentials were rejected by the table backend.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Credentials are valid but lack access to the table or a required scope.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transport-level failure talking to the table backend.
    #[error("network error: {0}")]
    NetworkFailed(String),

    /// The backend returned a non-zero business code not covered above.
    #[error("backend rejected request (code {code}): {msg}")]
    PublishRejected { code: i64, msg: String },

    /// Required configuration values are absent.
    #[error("missing configuration: {}", .missing.join(", "))]
    ConfigMissing { missing: Vec<String> },

    /// Configuration loading or parsing error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LinkPubError>;

impl LinkPubError {
    /// Classification used in run outcomes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::FetchFailed { .. } => ErrorKind::FetchFailed,
            Self::EmptyContent { .. } => ErrorKind::EmptyContent,
            Self::WechatUnavailable(_) => ErrorKind::WechatUnavailable,
            Self::InvalidAnalysis { .. } => ErrorKind::InvalidAnalysis,
            Self::InvalidStyle(_) => ErrorKind::InvalidStyle,
            Self::RenderFailed(_) => ErrorKind::RenderFailed,
            Self::OutputMissing { .. } => ErrorKind::OutputMissing,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::AuthFailed(_) => ErrorKind::AuthFailed,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NetworkFailed(_) => ErrorKind::NetworkFailed,
            Self::PublishRejected { .. } => ErrorKind::PublishRejected,
            Self::ConfigMissing { .. } => ErrorKind::ConfigMissing,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::InvalidAnalysis {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LinkPubError::config("missing base URL");
        assert_eq!(err.to_string(), "config error: missing base URL");

        let err = LinkPubError::ConfigMissing {
            missing: vec!["FEISHU_APP_ID".into(), "FEISHU_BASE_URL".into()],
        };
        assert_eq!(
            err.to_string(),
            "missing configuration: FEISHU_APP_ID, FEISHU_BASE_URL"
        );
    }

    #[test]
    fn kinds_are_distinct_for_publish_failures() {
        assert_eq!(
            LinkPubError::AuthFailed("expired".into()).kind(),
            ErrorKind::AuthFailed
        );
        assert_eq!(
            LinkPubError::PermissionDenied("no scope".into()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            LinkPubError::NetworkFailed("reset".into()).kind(),
            ErrorKind::NetworkFailed
        );
    }

    #[test]
    fn invalid_url_kind_renders_uppercase() {
        let err = LinkPubError::invalid_url("ftp://x", "unsupported scheme");
        assert_eq!(err.kind().to_string(), "InvalidURL");
    }
}
