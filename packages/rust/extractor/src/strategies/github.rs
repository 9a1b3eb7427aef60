//! GitHub repository strategy: repository description plus README from the
//! REST API instead of the rendered page.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use linkpub_shared::{ExtractedContent, GithubConfig, LinkPubError, Result, SourceType};

use super::ExtractStrategy;
use crate::{USER_AGENT, transport_error};

/// First path segments that are site sections, not user or org names.
const RESERVED_OWNERS: &[&str] = &[
    "about",
    "apps",
    "collections",
    "enterprise",
    "explore",
    "features",
    "login",
    "marketplace",
    "orgs",
    "pricing",
    "search",
    "settings",
    "sponsors",
    "topics",
    "trending",
];

/// `(owner, repo)` for a GitHub repository URL, `.git` suffix removed.
pub fn repo_coordinates(url: &Url) -> Option<(String, String)> {
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "github.com" && host != "www.github.com" {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");

    if repo.is_empty() || RESERVED_OWNERS.contains(&owner.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoMeta {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    html_url: String,
    owner: RepoOwner,
}

pub struct GithubStrategy {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubStrategy {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LinkPubError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn get(&self, path: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{path}", self.api_base))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn repo_meta(&self, url: &Url, owner: &str, repo: &str) -> Result<RepoMeta> {
        let response = self
            .get(&format!("/repos/{owner}/{repo}"), "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LinkPubError::fetch(
                url.as_str(),
                format!("repository {owner}/{repo} not found"),
            ));
        }
        if !status.is_success() {
            return Err(LinkPubError::fetch(url.as_str(), format!("GitHub API HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| LinkPubError::fetch(url.as_str(), format!("invalid repository JSON: {e}")))
    }

    /// Raw README text; `None` when the repository has none.
    async fn readme(&self, url: &Url, owner: &str, repo: &str) -> Result<Option<String>> {
        let response = self
            .get(&format!("/repos/{owner}/{repo}/readme"), "application/vnd.github.raw")
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(owner, repo, "repository has no README");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LinkPubError::fetch(url.as_str(), format!("README HTTP {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LinkPubError::fetch(url.as_str(), format!("README read failed: {e}")))?;
        Ok(Some(text))
    }
}

#[async_trait]
impl ExtractStrategy for GithubStrategy {
    #[instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url) -> Result<ExtractedContent> {
        let (owner, repo) = repo_coordinates(url).ok_or_else(|| {
            LinkPubError::invalid_url(url.as_str(), "not a GitHub repository URL")
        })?;

        let meta = self.repo_meta(url, &owner, &repo).await?;
        let readme = self.readme(url, &owner, &repo).await?;

        let body_text = [meta.description.clone(), readme]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if body_text.is_empty() {
            return Err(LinkPubError::EmptyContent {
                url: url.to_string(),
            });
        }

        info!(repo = %meta.full_name, stars = meta.stargazers_count, "repository metadata fetched");

        let mut raw = BTreeMap::new();
        raw.insert("stars".into(), serde_json::json!(meta.stargazers_count));
        raw.insert("html_url".into(), serde_json::json!(meta.html_url));
        if let Some(lang) = &meta.language {
            raw.insert("language".into(), serde_json::json!(lang));
        }
        if !meta.topics.is_empty() {
            raw.insert("topics".into(), serde_json::json!(meta.topics));
        }
        if let Some(desc) = &meta.description {
            raw.insert("description".into(), serde_json::json!(desc));
        }

        Ok(ExtractedContent {
            url: url.to_string(),
            title: meta.full_name,
            body_text,
            author: Some(meta.owner.login),
            source_type: SourceType::Github,
            raw,
        })
    }

    fn name(&self) -> &str {
        "github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpub_shared::ErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strategy_for(server: &MockServer) -> GithubStrategy {
        GithubStrategy::new(&GithubConfig {
            api_base: server.uri(),
            token: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn coordinates_from_repo_urls() {
        let cases = [
            ("https://github.com/tokio-rs/tokio", Some(("tokio-rs", "tokio"))),
            ("https://github.com/tokio-rs/tokio.git", Some(("tokio-rs", "tokio"))),
            (
                "https://www.github.com/serde-rs/serde/blob/master/README.md",
                Some(("serde-rs", "serde")),
            ),
            ("https://github.com/tokio-rs", None),
            ("https://github.com/topics/rust", None),
            ("https://gitlab.com/a/b", None),
        ];
        for (input, expected) in cases {
            let url = Url::parse(input).unwrap();
            let got = repo_coordinates(&url);
            let expected = expected.map(|(o, r)| (o.to_string(), r.to_string()));
            assert_eq!(got, expected, "{input}");
        }
    }

    #[tokio::test]
    async fn combines_description_and_readme() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": "acme/widget",
                "description": "A tiny widget library",
                "stargazers_count": 42,
                "language": "Rust",
                "topics": ["widgets", "ui"],
                "html_url": "https://github.com/acme/widget",
                "owner": { "login": "acme" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/readme"))
            .and(header("accept", "application/vnd.github.raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Widget\n\nUsage docs."))
            .mount(&server)
            .await;

        let strategy = strategy_for(&server);
        let url = Url::parse("https://github.com/acme/widget").unwrap();
        let content = strategy.extract(&url).await.unwrap();

        assert_eq!(content.title, "acme/widget");
        assert_eq!(content.source_type, SourceType::Github);
        assert_eq!(content.author.as_deref(), Some("acme"));
        assert!(content.body_text.starts_with("A tiny widget library"));
        assert!(content.body_text.contains("Usage docs."));
        assert_eq!(content.raw.get("stars"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn missing_readme_is_not_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/bare"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": "acme/bare",
                "description": "Only a description",
                "html_url": "https://github.com/acme/bare",
                "owner": { "login": "acme" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/bare/readme"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = strategy_for(&server);
        let content = strategy
            .extract(&Url::parse("https://github.com/acme/bare").unwrap())
            .await
            .unwrap();
        assert_eq!(content.body_text, "Only a description");
    }

    #[tokio::test]
    async fn unknown_repository_is_fetch_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = strategy_for(&server);
        let err = strategy
            .extract(&Url::parse("https://github.com/acme/ghost").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchFailed);
    }
}
