//! WeChat official-account articles.
//!
//! The generic reader cannot see these pages, so the article HTML is fetched
//! directly with a browser user agent. Verification and rate-limit pages are
//! reported as [`LinkPubError::WechatUnavailable`]; there is no fallback.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

use linkpub_shared::{ExtractedContent, LinkPubError, Result, SourceType, WechatConfig};

use super::ExtractStrategy;
use crate::transport_error;

static CREATE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"var createTime = ['"]([^'"]*)['"]"#).expect("valid regex"));

const ARTICLE_MARKER: &str = "var createTime = ";
const VERIFY_MARKER: &str = "当前环境异常";
const RATE_LIMIT_MARKER: &str = "操作频繁";

/// Fields pulled out of an article page.
#[derive(Debug, Default, PartialEq)]
struct Article {
    title: Option<String>,
    author: Option<String>,
    nickname: Option<String>,
    link: Option<String>,
    create_time: Option<String>,
    body: String,
}

pub struct WechatStrategy {
    client: Client,
    enabled: bool,
}

impl WechatStrategy {
    pub fn new(config: &WechatConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LinkPubError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            enabled: config.enabled,
        })
    }
}

/// Share links often carry HTML-escaped `&amp;` separators.
fn unescape_share_link(url: &Url) -> String {
    url.as_str().replace("amp;", "")
}

/// Classify the fetched page; only real articles pass.
fn check_page(html: &str) -> Result<()> {
    if html.contains(ARTICLE_MARKER) {
        Ok(())
    } else if html.contains(VERIFY_MARKER) {
        Err(LinkPubError::WechatUnavailable(
            "verification required by WeChat".into(),
        ))
    } else if html.contains(RATE_LIMIT_MARKER) {
        Err(LinkPubError::WechatUnavailable(
            "rate limited by WeChat".into(),
        ))
    } else {
        Err(LinkPubError::WechatUnavailable(
            "page is not a readable article".into(),
        ))
    }
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse article HTML. Kept synchronous: `Html` is not `Send`.
fn parse_article(html: &str) -> Article {
    let doc = Html::parse_document(html);

    let title = select_text(&doc, "h1#activity-name")
        .or_else(|| select_attr(&doc, r#"meta[property="og:title"]"#, "content"));

    let body = Selector::parse("#js_content")
        .ok()
        .and_then(|sel| doc.select(&sel).next().map(|el| el.text().collect::<Vec<_>>()))
        .unwrap_or_default()
        .iter()
        .flat_map(|chunk| chunk.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Article {
        title,
        author: select_attr(&doc, r#"meta[name="author"]"#, "content"),
        nickname: select_text(&doc, "#js_name"),
        link: select_attr(&doc, r#"meta[property="og:url"]"#, "content"),
        create_time: CREATE_TIME_RE.captures(html).map(|c| c[1].to_string()),
        body,
    }
}

#[async_trait]
impl ExtractStrategy for WechatStrategy {
    #[instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url) -> Result<ExtractedContent> {
        if !self.enabled {
            return Err(LinkPubError::WechatUnavailable(
                "WeChat fetching is disabled in configuration".into(),
            ));
        }

        let target = unescape_share_link(url);
        let response = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkPubError::fetch(url.as_str(), format!("HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| LinkPubError::fetch(url.as_str(), format!("body read failed: {e}")))?;

        if let Err(e) = check_page(&html) {
            warn!(error = %e, "WeChat article unavailable");
            return Err(e);
        }

        let article = parse_article(&html);
        if article.body.is_empty() {
            return Err(LinkPubError::EmptyContent {
                url: url.to_string(),
            });
        }

        let mut raw = BTreeMap::new();
        for (key, value) in [
            ("nickname", &article.nickname),
            ("create_time", &article.create_time),
            ("article_link", &article.link),
        ] {
            if let Some(v) = value {
                raw.insert(key.to_string(), serde_json::json!(v));
            }
        }

        let title = article
            .title
            .unwrap_or_else(|| crate::text::title_from_url(url));
        info!(%title, "WeChat article fetched");

        Ok(ExtractedContent {
            url: url.to_string(),
            title,
            body_text: article.body,
            author: article.author.or(article.nickname),
            source_type: SourceType::Wechat,
            raw,
        })
    }

    fn name(&self) -> &str {
        "wechat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpub_shared::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = r#"<html><head>
        <meta name="author" content="张三">
        <meta property="og:title" content="OG 标题">
        <meta property="og:url" content="https://mp.weixin.qq.com/s/abc">
        </head><body>
        <h1 id="activity-name">
            Rust 异步编程入门
        </h1>
        <a id="js_name"> 技术周刊 </a>
        <div id="js_content">
            <p>第一段内容</p>
            <p>   </p>
            <p>第二段内容</p>
        </div>
        <script>var createTime = '2025-03-01 10:00';</script>
        </body></html>"#;

    fn enabled() -> WechatConfig {
        WechatConfig {
            timeout_secs: 5,
            ..WechatConfig::default()
        }
    }

    #[test]
    fn parses_article_fields() {
        let article = parse_article(ARTICLE);
        assert_eq!(article.title.as_deref(), Some("Rust 异步编程入门"));
        assert_eq!(article.author.as_deref(), Some("张三"));
        assert_eq!(article.nickname.as_deref(), Some("技术周刊"));
        assert_eq!(article.create_time.as_deref(), Some("2025-03-01 10:00"));
        assert_eq!(article.body, "第一段内容\n第二段内容");
    }

    #[test]
    fn og_title_fallback() {
        let html = ARTICLE.replace(r#"id="activity-name""#, r#"id="other""#);
        assert_eq!(parse_article(&html).title.as_deref(), Some("OG 标题"));
    }

    #[test]
    fn page_classification() {
        assert!(check_page(ARTICLE).is_ok());
        for page in ["<p>当前环境异常</p>", "<p>操作频繁，请稍后再试</p>", "<p>hello</p>"] {
            assert_eq!(
                check_page(page).unwrap_err().kind(),
                ErrorKind::WechatUnavailable
            );
        }
    }

    #[test]
    fn share_link_is_unescaped() {
        let url = Url::parse("https://mp.weixin.qq.com/s?__biz=1&amp;mid=2").unwrap();
        assert_eq!(
            unescape_share_link(&url),
            "https://mp.weixin.qq.com/s?__biz=1&mid=2"
        );
    }

    #[tokio::test]
    async fn fetches_article_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .mount(&server)
            .await;

        let strategy = WechatStrategy::new(&enabled()).unwrap();
        let url = Url::parse(&format!("{}/s/abc", server.uri())).unwrap();
        let content = strategy.extract(&url).await.unwrap();

        assert_eq!(content.source_type, SourceType::Wechat);
        assert_eq!(content.title, "Rust 异步编程入门");
        assert_eq!(content.author.as_deref(), Some("张三"));
        assert_eq!(
            content.raw.get("nickname"),
            Some(&serde_json::json!("技术周刊"))
        );
    }

    #[tokio::test]
    async fn verification_page_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<div>当前环境异常，完成验证后即可继续访问</div>"),
            )
            .mount(&server)
            .await;

        let strategy = WechatStrategy::new(&enabled()).unwrap();
        let url = Url::parse(&format!("{}/s/blocked", server.uri())).unwrap();
        let err = strategy.extract(&url).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WechatUnavailable);
    }

    #[tokio::test]
    async fn disabled_strategy_never_fetches() {
        let strategy = WechatStrategy::new(&WechatConfig {
            enabled: false,
            ..WechatConfig::default()
        })
        .unwrap();
        let url = Url::parse("https://mp.weixin.qq.com/s/abc").unwrap();
        let err = strategy.extract(&url).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WechatUnavailable);
    }
}
