//! Publishing [`LinkRecord`]s as rows of a Feishu Bitable.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use linkpub_shared::{MAX_SUMMARY_CHARS, MAX_TITLE_CHARS};
use linkpub_shared::{FeishuCredentials, LinkPubError, LinkRecord, Result};

use crate::client::FeishuClient;
use crate::schema::{
    FIELD_CATEGORIES, FIELD_COVER, FIELD_CREATED, FIELD_SHARER, FIELD_SUMMARY, FIELD_TITLE,
    FieldMeta, validate_fields,
};

const PAGE_SIZE: &str = "100";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// App token and optional table id parsed from a Base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseLocator {
    pub app_token: String,
    pub table_id: Option<String>,
}

/// Parse `https://<tenant>/base/<app_token>[?table=<table_id>]`.
pub fn parse_base_locator(base_url: &str) -> Result<BaseLocator> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| LinkPubError::config(format!("invalid Base URL '{base_url}': {e}")))?;

    let app_token = url
        .path_segments()
        .and_then(|mut segments| {
            segments.find(|s| *s == "base")?;
            segments.next()
        })
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            LinkPubError::config(format!(
                "'{base_url}' is not a Bitable Base URL (/base/<app_token>)"
            ))
        })?
        .to_string();

    let table_id = url
        .query_pairs()
        .find(|(k, _)| k == "table")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());

    Ok(BaseLocator { app_token, table_id })
}

/// Result of a successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub record_id: String,
    pub cover_attached: bool,
    /// Degradations applied while publishing (truncation, cover skipped).
    pub notes: Vec<String>,
}

/// A row read back from the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedRecord {
    pub record_id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub categories: Vec<String>,
    pub sharer: Option<String>,
    pub created_at_ms: Option<i64>,
    pub cover_tokens: Vec<String>,
}

/// Resolved table and its fields, for diagnostics.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub app_token: String,
    pub table_id: String,
    pub fields: Vec<FieldMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Page<T> {
    #[serde(default)]
    items: Option<Vec<T>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableMeta {
    table_id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    record: RawRecord,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    record_id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    file_token: String,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

pub struct FeishuPublisher {
    client: FeishuClient,
    locator: BaseLocator,
    configured_table_id: Option<String>,
    table_name: Option<String>,
    table_id: OnceCell<String>,
    schema_checked: OnceCell<()>,
}

impl FeishuPublisher {
    pub fn new(credentials: FeishuCredentials) -> Result<Self> {
        let locator = parse_base_locator(&credentials.base_url)?;
        let client = FeishuClient::new(
            &credentials.api_base,
            &credentials.app_id,
            &credentials.app_secret,
            credentials.timeout_secs,
        )?;

        Ok(Self {
            client,
            locator,
            configured_table_id: credentials.table_id,
            table_name: credentials.table_name,
            table_id: OnceCell::new(),
            schema_checked: OnceCell::new(),
        })
    }

    pub fn app_token(&self) -> &str {
        &self.locator.app_token
    }

    /// Obtain a tenant token, proving the app credentials are valid.
    pub async fn check_auth(&self) -> Result<()> {
        self.client.tenant_token().await.map(|_| ())
    }

    /// Resolve the table and validate its schema.
    pub async fn check_schema(&self) -> Result<TableInfo> {
        let table_id = self.table_id().await?.to_string();
        let fields = self.list_fields(&table_id).await?;
        validate_fields(&fields)?;
        Ok(TableInfo {
            app_token: self.locator.app_token.clone(),
            table_id,
            fields,
        })
    }

    /// Write one record. Schema is validated before the first write.
    #[instrument(skip_all, fields(url = %record.source_url))]
    pub async fn publish(&self, record: &LinkRecord) -> Result<PublishReceipt> {
        self.schema_checked
            .get_or_try_init(|| async { self.check_schema().await.map(|_| ()) })
            .await?;
        let table_id = self.table_id().await?;

        let mut notes = Vec::new();
        let mut file_token = None;
        if let Some(path) = record.cover_path.as_deref() {
            if !is_file(path).await {
                warn!(path = %path.display(), "cover file missing; publishing without cover");
                notes.push(format!("cover {} not found; published without cover", path.display()));
            } else {
                match self.upload_cover(path).await {
                    Ok(token) => file_token = Some(token),
                    Err(e) => {
                        warn!(error = %e, "cover upload failed; publishing without cover");
                        notes.push(format!("cover upload failed: {e}"));
                    }
                }
            }
        }

        let fields = build_fields(record, file_token.as_deref(), &mut notes);
        let created: RecordEnvelope = self
            .client
            .post(
                &format!(
                    "/bitable/v1/apps/{}/tables/{table_id}/records?ignore_consistency_check=true",
                    self.locator.app_token
                ),
                &json!({ "fields": fields }),
            )
            .await?;

        info!(
            record_id = %created.record.record_id,
            cover = file_token.is_some(),
            "record published"
        );
        Ok(PublishReceipt {
            record_id: created.record.record_id,
            cover_attached: file_token.is_some(),
            notes,
        })
    }

    /// Read a published row back.
    pub async fn fetch_record(&self, record_id: &str) -> Result<PublishedRecord> {
        let table_id = self.table_id().await?;
        let fetched: RecordEnvelope = self
            .client
            .get(
                &format!(
                    "/bitable/v1/apps/{}/tables/{table_id}/records/{record_id}",
                    self.locator.app_token
                ),
                &[],
            )
            .await?;
        Ok(read_fields(fetched.record))
    }

    // -----------------------------------------------------------------------
    // Table resolution
    // -----------------------------------------------------------------------

    async fn table_id(&self) -> Result<&str> {
        self.table_id
            .get_or_try_init(|| self.resolve_table())
            .await
            .map(String::as_str)
    }

    /// Configured id, then `?table=`, then configured name, then first table.
    async fn resolve_table(&self) -> Result<String> {
        if let Some(id) = self
            .configured_table_id
            .clone()
            .or_else(|| self.locator.table_id.clone())
        {
            return Ok(id);
        }

        let tables: Vec<TableMeta> = self
            .paged(&format!("/bitable/v1/apps/{}/tables", self.locator.app_token))
            .await?;
        debug!(count = tables.len(), "listed tables");

        let chosen = match &self.table_name {
            Some(name) => tables.into_iter().find(|t| &t.name == name).ok_or_else(|| {
                LinkPubError::config(format!(
                    "table '{name}' not found in Base {}",
                    self.locator.app_token
                ))
            })?,
            None => tables.into_iter().next().ok_or_else(|| {
                LinkPubError::config(format!("Base {} has no tables", self.locator.app_token))
            })?,
        };

        info!(table_id = %chosen.table_id, name = %chosen.name, "resolved target table");
        Ok(chosen.table_id)
    }

    async fn list_fields(&self, table_id: &str) -> Result<Vec<FieldMeta>> {
        self.paged(&format!(
            "/bitable/v1/apps/{}/tables/{table_id}/fields",
            self.locator.app_token
        ))
        .await
    }

    async fn paged<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: Page<T> = self.client.get(path, &query).await?;
            items.extend(page.items.unwrap_or_default());

            match page.page_token {
                Some(token) if page.has_more && !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    async fn upload_cover(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LinkPubError::io(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("cover.png")
            .to_string();
        let size = bytes.len();

        let form = Form::new()
            .text("file_name", file_name.clone())
            .text("parent_type", "bitable_image")
            .text("parent_node", self.locator.app_token.clone())
            .text("size", size.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let uploaded: UploadResult = self
            .client
            .post_multipart("/drive/v1/medias/upload_all", form)
            .await?;
        debug!(size, file_token = %uploaded.file_token, "cover uploaded");
        Ok(uploaded.file_token)
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// Map a record onto table fields, truncating title and summary.
fn build_fields(
    record: &LinkRecord,
    file_token: Option<&str>,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    let mut record = record.clone();
    notes.extend(record.fit_to_limits());

    let mut fields = Map::new();
    fields.insert(
        FIELD_TITLE.into(),
        json!({ "text": record.title, "link": record.source_url }),
    );
    fields.insert(FIELD_SUMMARY.into(), json!(record.summary));
    fields.insert(FIELD_CATEGORIES.into(), json!(record.categories.labels()));
    if let Some(sharer) = &record.sharer {
        fields.insert(FIELD_SHARER.into(), json!(sharer));
    }
    fields.insert(FIELD_CREATED.into(), json!(record.created_at.timestamp_millis()));
    if let Some(token) = file_token {
        fields.insert(FIELD_COVER.into(), json!([{ "file_token": token }]));
    }
    fields
}

/// Text cells come back either as plain strings or as rich-text segments.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(segments) => Some(
            segments
                .iter()
                .filter_map(|seg| match seg {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect(),
        ),
        Value::Object(_) => value.get("text").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn read_fields(record: RawRecord) -> PublishedRecord {
    let fields = &record.fields;
    let title_cell = fields.get(FIELD_TITLE);

    PublishedRecord {
        title: title_cell.and_then(text_value),
        link: title_cell
            .and_then(|v| v.get("link"))
            .and_then(Value::as_str)
            .map(String::from),
        summary: fields.get(FIELD_SUMMARY).and_then(text_value),
        categories: fields
            .get(FIELD_CATEGORIES)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default(),
        sharer: fields.get(FIELD_SHARER).and_then(text_value),
        created_at_ms: fields.get(FIELD_CREATED).and_then(Value::as_i64),
        cover_tokens: fields
            .get(FIELD_COVER)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a.get("file_token").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        record_id: record.record_id,
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
