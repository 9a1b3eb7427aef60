//! Thin Feishu Open Platform client: tenant token, response envelope and
//! error classification.
//!
//! Every API response has the shape `{ "code": 0, "msg": "success", "data": {...} }`.
//! A non-zero `code` is mapped onto the publish error taxonomy.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use linkpub_shared::{LinkPubError, Result};

/// Business codes for invalid or expired credentials.
const AUTH_CODES: &[i64] = &[10003, 10014, 99991661, 99991663, 99991664, 99991668];

/// Business codes for valid credentials lacking access.
const PERMISSION_CODES: &[i64] = &[91403, 1254302, 99991672, 99991679];

pub(crate) struct FeishuClient {
    http: Client,
    api_base: String,
    app_id: String,
    app_secret: String,
    token: OnceCell<String>,
}

impl FeishuClient {
    pub fn new(api_base: &str, app_id: &str, app_secret: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("linkpub/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LinkPubError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            token: OnceCell::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    // -----------------------------------------------------------------------
    // Token management
    // -----------------------------------------------------------------------

    /// Tenant access token, fetched once per client.
    pub async fn tenant_token(&self) -> Result<&str> {
        self.token
            .get_or_try_init(|| self.request_token())
            .await
            .map(String::as_str)
    }

    #[instrument(skip(self))]
    async fn request_token(&self) -> Result<String> {
        let url = self.api_url("/auth/v3/tenant_access_token/internal");
        debug!(%url, "requesting tenant access token");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "app_id": self.app_id, "app_secret": self.app_secret }))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = read_body(response).await?;
        check_code(status, &body)?;

        let token = body
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                LinkPubError::AuthFailed("token response carried no tenant_access_token".into())
            })?;

        info!("obtained tenant access token");
        Ok(token.to_string())
    }

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let token = self.tenant_token().await?;
        let request = self.http.get(self.api_url(path)).bearer_auth(token).query(query);
        self.execute(request).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let token = self.tenant_token().await?;
        let request = self.http.post(self.api_url(path)).bearer_auth(token).json(body);
        self.execute(request).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let token = self.tenant_token().await?;
        let request = self.http.post(self.api_url(path)).bearer_auth(token).multipart(form);
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let body = read_body(response).await?;
        check_code(status, &body)?;

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| LinkPubError::PublishRejected {
            code: 0,
            msg: format!("unexpected response payload: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

fn network_error(e: reqwest::Error) -> LinkPubError {
    if e.is_timeout() {
        LinkPubError::NetworkFailed("request timed out".into())
    } else {
        LinkPubError::NetworkFailed(e.to_string())
    }
}

/// Body as JSON; non-JSON bodies become a synthetic envelope.
async fn read_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.map_err(network_error)?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| {
        json!({
            "code": i64::from(status.as_u16()),
            "msg": text.chars().take(200).collect::<String>(),
        })
    }))
}

fn check_code(status: StatusCode, body: &Value) -> Result<()> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if status.is_success() && code == 0 {
        return Ok(());
    }
    let msg = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(classify(status, code, msg))
}

/// Map an HTTP status and Feishu business code onto an error kind.
pub(crate) fn classify(status: StatusCode, code: i64, msg: String) -> LinkPubError {
    if status == StatusCode::UNAUTHORIZED || AUTH_CODES.contains(&code) {
        LinkPubError::AuthFailed(format!("{msg} (code {code})"))
    } else if status == StatusCode::FORBIDDEN || PERMISSION_CODES.contains(&code) {
        LinkPubError::PermissionDenied(format!("{msg} (code {code})"))
    } else if status.is_server_error() {
        LinkPubError::NetworkFailed(format!("HTTP {status}: {msg}"))
    } else {
        LinkPubError::PublishRejected { code, msg }
    }
}
