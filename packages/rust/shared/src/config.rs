//! Application configuration for linkpub.
//!
//! User config lives at `~/.linkpub/linkpub.toml`. Values from the process
//! environment (and a `.env` file in the working directory) override the file,
//! which overrides defaults. The resolved [`AppConfig`] is built once at start-up
//! and handed to each component by reference.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LinkPubError, Result};
use crate::types::DEFAULT_SUBTITLE;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkpub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkpub";

pub const ENV_APP_ID: &str = "FEISHU_APP_ID";
pub const ENV_APP_SECRET: &str = "FEISHU_APP_SECRET";
pub const ENV_BASE_URL: &str = "FEISHU_BASE_URL";
pub const ENV_TABLE_ID: &str = "FEISHU_TABLE_ID";
pub const ENV_READER_KEY: &str = "JINA_API_KEY";

// ---------------------------------------------------------------------------
// Config structs (matching linkpub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub wechat: WechatConfig,

    #[serde(default)]
    pub cover: CoverConfig,

    #[serde(default)]
    pub feishu: FeishuConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[reader]` section: the URL-to-markdown reader service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Prefix placed in front of the target URL.
    #[serde(default = "default_reader_base")]
    pub base_url: String,

    /// Optional bearer key; raises the service's rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_reader_timeout")]
    pub timeout_secs: u64,

    /// Fetch the page itself and scrape its main text when the reader fails.
    #[serde(default)]
    pub direct_fallback: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_url: default_reader_base(),
            api_key: None,
            timeout_secs: default_reader_timeout(),
            direct_fallback: false,
        }
    }
}

fn default_reader_base() -> String {
    "https://r.jina.ai/".into()
}
fn default_reader_timeout() -> u64 {
    60
}

/// `[github]` section: repository metadata lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,

    /// Optional token for higher API rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            token: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".into()
}
fn default_http_timeout() -> u64 {
    30
}

/// `[wechat]` section: the direct WeChat article fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    /// When false, WeChat links fail with `WechatUnavailable`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_wechat_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_browser_agent")]
    pub user_agent: String,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_wechat_timeout(),
            user_agent: default_browser_agent(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_wechat_timeout() -> u64 {
    10
}
fn default_browser_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36"
        .into()
}

/// `[cover]` section: the external cover-render tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Executable to spawn.
    #[serde(default = "default_cover_command")]
    pub command: String,

    /// Arguments placed before the title (e.g. `["-m", "generate_cover"]`).
    #[serde(default)]
    pub args: Vec<String>,

    /// Directory covers are written to.
    #[serde(default = "default_cover_dir")]
    pub output_dir: String,

    #[serde(default = "default_subtitle")]
    pub subtitle: String,

    /// Style used when the requested one is rejected.
    #[serde(default = "default_fallback_style")]
    pub fallback_style: String,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            command: default_cover_command(),
            args: Vec::new(),
            output_dir: default_cover_dir(),
            subtitle: default_subtitle(),
            fallback_style: default_fallback_style(),
        }
    }
}

fn default_cover_command() -> String {
    "generate-cover".into()
}
fn default_cover_dir() -> String {
    "output".into()
}
fn default_subtitle() -> String {
    DEFAULT_SUBTITLE.into()
}
fn default_fallback_style() -> String {
    "tech".into()
}

/// `[feishu]` section: the Bitable the links are published to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,

    /// Bitable URL, e.g. `https://xxx.feishu.cn/base/<app_token>?table=<table_id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    #[serde(default = "default_feishu_api")]
    pub api_base: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            base_url: None,
            table_id: None,
            table_name: None,
            api_base: default_feishu_api(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_feishu_api() -> String {
    "https://open.feishu.cn/open-apis".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Keep going with the URL's domain as title when extraction fails.
    #[serde(default)]
    pub continue_on_extract_failure: bool,

    #[serde(default = "default_true")]
    pub generate_cover: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_extract_failure: false,
            generate_cover: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved Feishu credentials
// ---------------------------------------------------------------------------

/// Complete set of values needed to publish. Absent when unconfigured.
#[derive(Debug, Clone)]
pub struct FeishuCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub base_url: String,
    pub table_id: Option<String>,
    pub table_name: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl FeishuCredentials {
    /// Fails with `ConfigMissing` naming every absent variable.
    pub fn from_config(config: &FeishuConfig) -> Result<Self> {
        let present = |v: &Option<String>| {
            v.as_deref().filter(|s| !s.trim().is_empty()).map(String::from)
        };

        let app_id = present(&config.app_id);
        let app_secret = present(&config.app_secret);
        let base_url = present(&config.base_url);

        match (app_id, app_secret, base_url) {
            (Some(app_id), Some(app_secret), Some(base_url)) => Ok(Self {
                app_id,
                app_secret,
                base_url,
                table_id: present(&config.table_id),
                table_name: present(&config.table_name),
                api_base: config.api_base.clone(),
                timeout_secs: config.timeout_secs,
            }),
            (app_id, app_secret, base_url) => {
                let missing = [
                    (app_id.is_none(), ENV_APP_ID),
                    (app_secret.is_none(), ENV_APP_SECRET),
                    (base_url.is_none(), ENV_BASE_URL),
                ]
                .into_iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, name)| name.to_string())
                .collect();
                Err(LinkPubError::ConfigMissing { missing })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Overlay values from a variable lookup (normally the process environment).
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_APP_ID) {
            self.feishu.app_id = Some(v);
        }
        if let Some(v) = get(ENV_APP_SECRET) {
            self.feishu.app_secret = Some(v);
        }
        if let Some(v) = get(ENV_BASE_URL) {
            self.feishu.base_url = Some(v);
        }
        if let Some(v) = get(ENV_TABLE_ID) {
            self.feishu.table_id = Some(v);
        }
        if let Some(v) = get(ENV_READER_KEY) {
            self.reader.api_key = Some(v);
        }
    }

    /// Overlay values from the real process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Copy with every secret replaced by its masked form, for display.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &mut Option<String>| {
            if let Some(s) = v.as_mut() {
                *s = mask_secret(s);
            }
        };
        mask(&mut copy.reader.api_key);
        mask(&mut copy.github.token);
        mask(&mut copy.feishu.app_secret);
        mask(&mut copy.feishu.app_id);
        copy
    }
}

/// Show the first and last three characters of a secret.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 6 {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".into()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkpub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkPubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkpub/linkpub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the full configuration: `.env`, then the config file (explicit path
/// or the default location), then environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(?path, "loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
    }

    let mut config = match explicit {
        Some(path) => load_config_from(path)?,
        None => {
            let path = config_file_path()?;
            if path.exists() {
                load_config_from(&path)?
            } else {
                tracing::debug!(?path, "config file not found, using defaults");
                AppConfig::default()
            }
        }
    };

    config.apply_env();
    Ok(config)
}

/// Load the application config from a specific file path (no env overlay).
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkPubError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LinkPubError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkPubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| LinkPubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkPubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
