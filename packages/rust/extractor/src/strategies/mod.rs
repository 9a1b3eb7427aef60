//! Extraction strategy trait and the URL dispatch table.
//!
//! `auto` detection walks an ordered list of (predicate, strategy) pairs:
//! WeChat article domains first, then GitHub repositories, then the generic
//! reader, which matches everything.

mod github;
mod reader;
mod wechat;

use async_trait::async_trait;
use url::Url;

use linkpub_shared::{ExtractedContent, Result};

pub use github::{GithubStrategy, repo_coordinates};
pub use reader::ReaderStrategy;
pub use wechat::WechatStrategy;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One way of turning a URL into [`ExtractedContent`].
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    /// Fetch and normalize the content behind `url`.
    async fn extract(&self, url: &Url) -> Result<ExtractedContent>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

/// URL predicate used by the dispatch table.
pub type UrlPredicate = fn(&Url) -> bool;

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// `mp.weixin.qq.com` and other `weixin.qq.com` hosts.
pub fn is_wechat_article(url: &Url) -> bool {
    url.host_str()
        .map(|h| {
            let h = h.to_ascii_lowercase();
            h == "weixin.qq.com" || h.ends_with(".weixin.qq.com")
        })
        .unwrap_or(false)
}

/// `github.com/<owner>/<repo>[/...]`, excluding site sections like `/topics/...`.
pub fn is_github_repo(url: &Url) -> bool {
    repo_coordinates(url).is_some()
}

fn matches_anything(_url: &Url) -> bool {
    true
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds strategies in priority order; the last entry always matches.
pub struct StrategyRegistry {
    rules: Vec<(UrlPredicate, Box<dyn ExtractStrategy>)>,
}

impl StrategyRegistry {
    /// Standard table: wechat → github → reader.
    pub fn new(reader: ReaderStrategy, github: GithubStrategy, wechat: WechatStrategy) -> Self {
        Self {
            rules: vec![
                (is_wechat_article as UrlPredicate, Box::new(wechat) as Box<dyn ExtractStrategy>),
                (is_github_repo as UrlPredicate, Box::new(github) as Box<dyn ExtractStrategy>),
                (matches_anything as UrlPredicate, Box::new(reader) as Box<dyn ExtractStrategy>),
            ],
        }
    }

    /// Pick the first strategy whose predicate accepts the URL.
    pub fn detect(&self, url: &Url) -> &dyn ExtractStrategy {
        for (predicate, strategy) in &self.rules {
            if predicate(url) {
                return strategy.as_ref();
            }
        }
        unreachable!("the reader strategy must always match");
    }

    /// Look a strategy up by name (`reader`, `github`, `wechat`).
    pub fn named(&self, name: &str) -> Option<&dyn ExtractStrategy> {
        self.rules
            .iter()
            .map(|(_, s)| s.as_ref())
            .find(|s| s.name() == name)
    }
}
