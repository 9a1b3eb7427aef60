//! Publishing ready-made records from a records file, one after another.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use linkpub_extractor::parse_target;
use linkpub_shared::{
    Category, CategorySet, LinkPubError, LinkRecord, OutcomeStatus, Result, RunOutcome, Stage,
};

use crate::pipeline::{ProgressReporter, failed};
use crate::stages::RecordSink;

/// One entry of a records file. `cover` and `sender` are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, alias = "cover", skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<PathBuf>,
    #[serde(default, alias = "sender", skip_serializing_if = "Option::is_none")]
    pub sharer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecordEntry {
    /// Validate into a [`LinkRecord`]. No categories means 其他.
    pub fn into_record(self) -> Result<LinkRecord> {
        let url = parse_target(&self.url)?;
        if self.title.trim().is_empty() {
            return Err(LinkPubError::analysis("title must not be empty"));
        }
        let categories = if self.categories.is_empty() {
            CategorySet::single(Category::Other)
        } else {
            CategorySet::parse(&self.categories)?
        };

        Ok(LinkRecord {
            source_url: url.to_string(),
            title: self.title,
            summary: self.summary,
            categories,
            sharer: self.sharer,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            cover_path: self.cover_path,
        })
    }
}

/// Read a records file: a JSON array of [`RecordEntry`] objects.
pub fn load_record_entries(path: &Path) -> Result<Vec<RecordEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| LinkPubError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        LinkPubError::config(format!("failed to parse records file {}: {e}", path.display()))
    })
}

/// Publish entries in file order. A failing entry never stops the rest.
///
/// Without a sink nothing is written: valid entries come back `skipped`
/// with the record that would have been published.
#[instrument(skip_all, fields(count = entries.len(), dry_run = sink.is_none()))]
pub async fn publish_records(
    entries: Vec<RecordEntry>,
    sink: Option<&dyn RecordSink>,
    progress: &dyn ProgressReporter,
) -> Vec<RunOutcome> {
    let total = entries.len();
    let mut outcomes = Vec::with_capacity(total);

    for (idx, entry) in entries.into_iter().enumerate() {
        let url = entry.url.trim().to_string();
        progress.url_started(&url, idx + 1, total);
        progress.stage(&url, Stage::Publishing);
        let outcome = publish_one(entry, &url, sink).await;
        progress.url_finished(&outcome);
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| o.status == OutcomeStatus::Failed).count();
    info!(total, failed, "records file processed");
    outcomes
}

async fn publish_one(entry: RecordEntry, url: &str, sink: Option<&dyn RecordSink>) -> RunOutcome {
    let mut record = match entry.into_record() {
        Ok(record) => record,
        Err(e) => return failed(url, Stage::Publishing, &e, Vec::new()),
    };
    let mut notes = record.fit_to_limits();

    let Some(sink) = sink else {
        return RunOutcome {
            url: url.to_string(),
            status: OutcomeStatus::Skipped,
            stage: Stage::Publishing,
            error: None,
            record: Some(record),
            record_id: None,
            notes,
        };
    };

    match sink.publish(&record).await {
        Ok(receipt) => {
            notes.extend(receipt.notes);
            RunOutcome {
                url: url.to_string(),
                status: OutcomeStatus::Success,
                stage: Stage::Done,
                error: None,
                record: Some(record),
                record_id: Some(receipt.record_id),
                notes,
            }
        }
        Err(e) => RunOutcome {
            record: Some(record),
            ..failed(url, Stage::Publishing, &e, notes)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::report::BatchReport;
    use linkpub_publisher::{EXPECTED_FIELDS, FeishuPublisher};
    use linkpub_shared::{ErrorKind, FeishuCredentials};
    use serde_json::{Value, json};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APP: &str = "bascnApp123";
    const TABLE: &str = "tblLinks";

    fn entry(url: &str, title: &str) -> RecordEntry {
        RecordEntry {
            url: url.into(),
            title: title.into(),
            summary: "s".into(),
            categories: vec!["技术文档".into()],
            ..Default::default()
        }
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
    }

    async fn feishu_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "msg": "ok", "tenant_access_token": "t-1", "expire": 7200
            })))
            .mount(&server)
            .await;

        let items: Vec<Value> = EXPECTED_FIELDS
            .iter()
            .map(|(name, ty)| json!({ "field_name": name, "type": ty.code() }))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/bitable/v1/apps/{APP}/tables/{TABLE}/fields")))
            .respond_with(ok(json!({ "items": items, "has_more": false })))
            .mount(&server)
            .await;
        server
    }

    fn publisher(server: &MockServer) -> FeishuPublisher {
        FeishuPublisher::new(FeishuCredentials {
            app_id: "cli_a".into(),
            app_secret: "secret".into(),
            base_url: format!("https://acme.feishu.cn/base/{APP}"),
            table_id: Some(TABLE.into()),
            table_name: None,
            api_base: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn rejected_entry_does_not_stop_the_rest() {
        let server = feishu_server().await;
        let records_path = format!("/bitable/v1/apps/{APP}/tables/{TABLE}/records");
        Mock::given(method("POST"))
            .and(path(records_path.clone()))
            .and(body_string_contains("Broken entry"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1254045, "msg": "FieldNameNotFound"
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(records_path))
            .respond_with(ok(json!({ "record": { "record_id": "recOK", "fields": {} } })))
            .expect(2)
            .mount(&server)
            .await;

        let publisher = publisher(&server);
        let outcomes = publish_records(
            vec![
                entry("https://a.dev/1", "First"),
                entry("https://b.dev/2", "Broken entry"),
                entry("https://c.dev/3", "Third"),
            ],
            Some(&publisher as &dyn RecordSink),
            &SilentProgress,
        )
        .await;

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OutcomeStatus::Success, OutcomeStatus::Failed, OutcomeStatus::Success]
        );
        assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::PublishRejected));
        assert_eq!(outcomes[2].record_id.as_deref(), Some("recOK"));

        let report = BatchReport::new(outcomes, false);
        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn without_sink_entries_are_validated_and_skipped() {
        let mut long = entry("https://a.dev/1", &"长".repeat(60));
        long.categories.clear();
        let outcomes = publish_records(
            vec![long, entry("not a url", "Bad"), entry("https://c.dev/3", "")],
            None,
            &SilentProgress,
        )
        .await;

        assert_eq!(outcomes[0].status, OutcomeStatus::Skipped);
        let record = outcomes[0].record.as_ref().unwrap();
        assert_eq!(record.title.chars().count(), linkpub_shared::MAX_TITLE_CHARS);
        assert_eq!(record.categories.as_slice(), &[Category::Other]);
        assert!(outcomes[0].notes.iter().any(|n| n.starts_with("title truncated")));

        assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::InvalidUrl));
        assert_eq!(outcomes[2].error_kind(), Some(ErrorKind::InvalidAnalysis));
    }

    #[test]
    fn records_file_accepts_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("records.json");
        std::fs::write(
            &file,
            r#"[{"title": "T", "url": "https://x.dev", "summary": "S",
                 "categories": ["技术文档"], "cover": "covers/a.png", "sender": "bob"}]"#,
        )
        .unwrap();

        let entries = load_record_entries(&file).unwrap();
        assert_eq!(entries[0].cover_path, Some(PathBuf::from("covers/a.png")));
        assert_eq!(entries[0].sharer.as_deref(), Some("bob"));

        let record = entries[0].clone().into_record().unwrap();
        assert_eq!(record.source_url, "https://x.dev/");
        assert_eq!(record.categories.labels(), vec!["技术文档"]);
    }
}
