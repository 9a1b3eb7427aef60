//! Content extraction: turn a link into normalized [`ExtractedContent`].
//!
//! This crate provides:
//! - [`strategies`]: reader, GitHub and WeChat extraction strategies
//! - [`StrategyRegistry`]: ordered URL dispatch used by `auto` detection
//! - [`Extractor`]: the entry point combining URL validation and dispatch

pub mod strategies;
mod text;

use tracing::{debug, instrument};
use url::Url;

use linkpub_shared::{AppConfig, ExtractedContent, LinkPubError, Result, SourceType, TypeHint};

pub use strategies::{
    ExtractStrategy, GithubStrategy, ReaderStrategy, StrategyRegistry, UrlPredicate,
    WechatStrategy, is_github_repo, is_wechat_article, repo_coordinates,
};

/// User agent for API-style requests.
pub(crate) const USER_AGENT: &str = concat!("linkpub/", env!("CARGO_PKG_VERSION"));

/// Map a reqwest send error onto `FetchFailed`.
pub(crate) fn transport_error(url: &Url, err: &reqwest::Error) -> LinkPubError {
    if err.is_timeout() {
        LinkPubError::fetch(url.as_str(), "request timed out")
    } else {
        LinkPubError::fetch(url.as_str(), format!("request failed: {err}"))
    }
}

/// Validate a user-supplied link: absolute http(s) URL with a host.
pub fn parse_target(input: &str) -> Result<Url> {
    let input = input.trim();
    let url = Url::parse(input).map_err(|e| LinkPubError::invalid_url(input, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LinkPubError::invalid_url(
            input,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(LinkPubError::invalid_url(input, "missing host"));
    }
    Ok(url)
}

/// Entry point for the extraction stage.
pub struct Extractor {
    registry: StrategyRegistry,
}

impl Extractor {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let registry = StrategyRegistry::new(
            ReaderStrategy::new(&config.reader)?,
            GithubStrategy::new(&config.github)?,
            WechatStrategy::new(&config.wechat)?,
        );
        Ok(Self { registry })
    }

    pub fn from_registry(registry: StrategyRegistry) -> Self {
        Self { registry }
    }

    /// Name of the strategy `hint` resolves to for `url`.
    pub fn strategy_name(&self, url: &Url, hint: TypeHint) -> &str {
        self.strategy_for(url, hint).name()
    }

    fn strategy_for(&self, url: &Url, hint: TypeHint) -> &dyn ExtractStrategy {
        let named = match hint {
            TypeHint::Auto => return self.registry.detect(url),
            TypeHint::Webpage | TypeHint::Article => "reader",
            TypeHint::Github => "github",
            TypeHint::Wechat => "wechat",
        };
        self.registry
            .named(named)
            .unwrap_or_else(|| self.registry.detect(url))
    }

    /// Fetch `url` using the strategy selected by `hint`.
    #[instrument(skip(self), fields(strategy = tracing::field::Empty))]
    pub async fn extract(&self, url: &str, hint: TypeHint) -> Result<ExtractedContent> {
        let target = parse_target(url)?;
        let strategy = self.strategy_for(&target, hint);
        tracing::Span::current().record("strategy", strategy.name());
        debug!(strategy = strategy.name(), "dispatching extraction");

        let mut content = strategy.extract(&target).await?;
        if hint == TypeHint::Article {
            content.source_type = SourceType::Article;
        }
        Ok(content)
    }
}
