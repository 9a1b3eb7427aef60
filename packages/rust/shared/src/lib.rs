//! Shared types, error model, and configuration for linkpub.
//!
//! This crate is the foundation depended on by all other linkpub crates.
//! It provides:
//! - [`LinkPubError`] and [`ErrorKind`]: the unified error taxonomy
//! - Domain types ([`ExtractedContent`], [`AnalysisResult`], [`LinkRecord`], [`RunOutcome`])
//! - Configuration ([`AppConfig`], [`FeishuCredentials`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CoverConfig, FeishuConfig, FeishuCredentials, GithubConfig, PipelineConfig,
    ReaderConfig, WechatConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, mask_secret,
};
pub use error::{ErrorKind, LinkPubError, Result};
pub use types::{
    AnalysisResult, Category, CategorySet, CoverSpec, CoverStyle, DEFAULT_SUBTITLE,
    ExtractedContent, LinkRecord, MAX_CATEGORIES, MAX_SUMMARY_CHARS, MAX_TITLE_CHARS,
    OutcomeError, OutcomeStatus, RunOutcome, SourceType, Stage, TypeHint, truncate_chars,
};
