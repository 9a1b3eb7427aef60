//! Per-URL orchestration: extract → analyze → cover → publish.
//!
//! URLs are processed strictly in input order, one at a time, and each stage
//! is awaited before the next starts. A failure in one URL is recorded in its
//! [`RunOutcome`] and never stops the batch.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, instrument, warn};
use url::Url;

use linkpub_shared::{
    AppConfig, CoverSpec, DEFAULT_SUBTITLE, ErrorKind, ExtractedContent, LinkPubError, LinkRecord,
    OutcomeError, OutcomeStatus, RunOutcome, SourceType, Stage, TypeHint,
};

use crate::analyzer::Analyzer;
use crate::stages::{ContentSource, CoverRenderer, RecordSink};

/// Knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub type_hint: TypeHint,
    pub generate_cover: bool,
    /// Analyze on degraded metadata instead of failing when extraction fails.
    pub continue_on_extract_failure: bool,
    pub output_dir: PathBuf,
    pub subtitle: String,
    /// Style for the single retry after the renderer rejects a style.
    pub fallback_style: String,
    pub sharer: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            type_hint: TypeHint::Auto,
            generate_cover: true,
            continue_on_extract_failure: false,
            output_dir: PathBuf::from("output"),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            fallback_style: "tech".to_string(),
            sharer: None,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            generate_cover: config.pipeline.generate_cover,
            continue_on_extract_failure: config.pipeline.continue_on_extract_failure,
            output_dir: PathBuf::from(&config.cover.output_dir),
            subtitle: config.cover.subtitle.clone(),
            fallback_style: config.cover.fallback_style.clone(),
            ..Self::default()
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before the first stage of a URL.
    fn url_started(&self, url: &str, index: usize, total: usize);
    /// Called when a URL enters a new stage.
    fn stage(&self, url: &str, stage: Stage);
    /// Called once a URL has an outcome.
    fn url_finished(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn url_started(&self, _url: &str, _index: usize, _total: usize) {}
    fn stage(&self, _url: &str, _stage: Stage) {}
    fn url_finished(&self, _outcome: &RunOutcome) {}
}

pub struct Orchestrator {
    source: Box<dyn ContentSource>,
    analyzer: Box<dyn Analyzer>,
    renderer: Option<Box<dyn CoverRenderer>>,
    sink: Option<Box<dyn RecordSink>>,
    /// Names reported in `ConfigMissing` when publishing without a sink.
    sink_missing: Vec<String>,
    progress: Box<dyn ProgressReporter>,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        source: Box<dyn ContentSource>,
        analyzer: Box<dyn Analyzer>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            analyzer,
            renderer: None,
            sink: None,
            sink_missing: vec!["publisher".to_string()],
            progress: Box::new(SilentProgress),
            options,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn CoverRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record why no sink is available, for the `ConfigMissing` error.
    pub fn with_sink_missing(mut self, missing: Vec<String>) -> Self {
        self.sink_missing = missing;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Process every URL in order. Dry runs never touch the sink.
    #[instrument(skip_all, fields(count = urls.len(), dry_run = dry_run))]
    pub async fn run(&self, urls: &[String], dry_run: bool) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(urls.len());
        for (idx, url) in urls.iter().enumerate() {
            self.progress.url_started(url, idx + 1, urls.len());
            let outcome = self.run_one(url, dry_run).await;
            self.progress.url_finished(&outcome);
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.status == OutcomeStatus::Failed).count();
        info!(total = outcomes.len(), failed, "pipeline run complete");
        outcomes
    }

    #[instrument(skip(self))]
    async fn run_one(&self, url: &str, dry_run: bool) -> RunOutcome {
        let mut notes = Vec::new();

        // --- Stage 1: Extract ---
        self.progress.stage(url, Stage::Extracting);
        let content = match self.source.fetch(url, self.options.type_hint).await {
            Ok(content) => content,
            Err(e) if self.options.continue_on_extract_failure => match degraded_content(url) {
                Some(content) => {
                    warn!(error = %e, "extraction failed; continuing on degraded metadata");
                    notes.push(format!("extraction failed ({e}); analyzed on degraded metadata"));
                    content
                }
                None => return failed(url, Stage::Extracting, &e, notes),
            },
            Err(e) => return failed(url, Stage::Extracting, &e, notes),
        };

        // --- Stage 2: Analyze ---
        self.progress.stage(url, Stage::Analyzing);
        let analysis = match self.analyzer.analyze(&content).await {
            Ok(analysis) => analysis,
            Err(e) => return failed(url, Stage::Analyzing, &e, notes),
        };

        // --- Stage 3: Cover ---
        let mut cover_path = None;
        if self.options.generate_cover {
            if let Some(renderer) = &self.renderer {
                self.progress.stage(url, Stage::CoverGenerating);
                let spec = CoverSpec {
                    title: analysis.title.clone(),
                    subtitle: self.options.subtitle.clone(),
                    style: analysis.cover_style.as_str().to_string(),
                    output_dir: self.options.output_dir.clone(),
                    file_name: None,
                };
                match self.render_with_fallback(renderer.as_ref(), spec).await {
                    Ok(path) => cover_path = Some(path),
                    Err(e) => {
                        warn!(error = %e, "cover generation failed; continuing without cover");
                        notes.push(format!("cover skipped: {e}"));
                    }
                }
            }
        }

        let mut record = LinkRecord {
            source_url: url.to_string(),
            title: analysis.title,
            summary: analysis.summary,
            categories: analysis.categories,
            sharer: self.options.sharer.clone(),
            created_at: Utc::now(),
            cover_path,
        };
        notes.extend(record.fit_to_limits());

        if dry_run {
            info!(title = %record.title, "dry run; not publishing");
            return RunOutcome {
                url: url.to_string(),
                status: OutcomeStatus::Skipped,
                stage: Stage::Publishing,
                error: None,
                record: Some(record),
                record_id: None,
                notes,
            };
        }

        // --- Stage 4: Publish ---
        self.progress.stage(url, Stage::Publishing);
        let Some(sink) = &self.sink else {
            let e = LinkPubError::ConfigMissing {
                missing: self.sink_missing.clone(),
            };
            return RunOutcome {
                record: Some(record),
                ..failed(url, Stage::Publishing, &e, notes)
            };
        };

        match sink.publish(&record).await {
            Ok(receipt) => {
                notes.extend(receipt.notes);
                info!(record_id = %receipt.record_id, "published");
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

    /// Render once; on `InvalidStyle`, retry once with the fallback style.
    async fn render_with_fallback(
        &self,
        renderer: &dyn CoverRenderer,
        spec: CoverSpec,
    ) -> linkpub_shared::Result<PathBuf> {
        match renderer.render(&spec).await {
            Err(e) if e.kind() == ErrorKind::InvalidStyle => {
                warn!(
                    style = %spec.style,
                    fallback = %self.options.fallback_style,
                    "style rejected; retrying with fallback"
                );
                let retry = CoverSpec {
                    style: self.options.fallback_style.clone(),
                    ..spec
                };
                renderer.render(&retry).await
            }
            other => other,
        }
    }
}

/// Stand-in content when extraction failed: the URL's domain as title.
fn degraded_content(url: &str) -> Option<ExtractedContent> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_string();
    Some(ExtractedContent {
        url: parsed.to_string(),
        title: host,
        body_text: String::new(),
        author: None,
        source_type: SourceType::Webpage,
        raw: Default::default(),
    })
}

pub(crate) fn failed(
    url: &str,
    stage: Stage,
    err: &LinkPubError,
    notes: Vec<String>,
) -> RunOutcome {
    warn!(%url, ?stage, kind = %err.kind(), error = %err, "url failed");
    RunOutcome {
        url: url.to_string(),
        status: OutcomeStatus::Failed,
        stage,
        error: Some(OutcomeError::from(err)),
        record: None,
        record_id: None,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ManualAnalyzer;
    use async_trait::async_trait;
    use linkpub_publisher::PublishReceipt;
    use linkpub_shared::Result;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    // -----------------------------------------------------------------------
    // Stubs
    // -----------------------------------------------------------------------

    /// Fails for unparseable URLs and those containing "broken".
    struct StubSource;

    #[async_trait]
    impl ContentSource for StubSource {
        async fn fetch(&self, url: &str, _hint: TypeHint) -> Result<ExtractedContent> {
            if Url::parse(url).is_err() {
                return Err(LinkPubError::invalid_url(url, "unparseable"));
            }
            if url.contains("broken") {
                return Err(LinkPubError::fetch(url, "HTTP 500"));
            }
            Ok(ExtractedContent {
                url: url.to_string(),
                title: format!("Title of {url}"),
                body_text: "body".into(),
                author: None,
                source_type: SourceType::Webpage,
                raw: BTreeMap::new(),
            })
        }
    }

    /// Records every style requested; rejects styles listed in `reject`.
    #[derive(Default, Clone)]
    struct StubRenderer {
        styles: Arc<Mutex<Vec<String>>>,
        reject: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl CoverRenderer for StubRenderer {
        async fn render(&self, spec: &CoverSpec) -> Result<PathBuf> {
            self.styles.lock().unwrap().push(spec.style.clone());
            if self.fail {
                return Err(LinkPubError::RenderFailed("tool crashed".into()));
            }
            if self.reject.contains(&spec.style.as_str()) {
                return Err(LinkPubError::InvalidStyle(spec.style.clone()));
            }
            Ok(spec.output_dir.join(format!("{}.png", spec.style)))
        }
    }

    #[derive(Default, Clone)]
    struct StubSink {
        published: Arc<Mutex<Vec<LinkRecord>>>,
        reject: bool,
    }

    #[async_trait]
    impl RecordSink for StubSink {
        async fn publish(&self, record: &LinkRecord) -> Result<PublishReceipt> {
            if self.reject {
                return Err(LinkPubError::PermissionDenied("no access".into()));
            }
            let mut published = self.published.lock().unwrap();
            published.push(record.clone());
            Ok(PublishReceipt {
                record_id: format!("rec{}", published.len()),
                cover_attached: record.cover_path.is_some(),
                notes: Vec::new(),
            })
        }
    }

    fn orchestrator(options: PipelineOptions) -> Orchestrator {
        Orchestrator::new(Box::new(StubSource), Box::new(ManualAnalyzer::new()), options)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn batch_continues_past_failed_url() {
        let sink = StubSink::default();
        let orch = orchestrator(PipelineOptions::default()).with_sink(Box::new(sink.clone()));

        let outcomes = orch
            .run(&urls(&["https://a.dev/1", "https://broken.dev/2", "https://c.dev/3"]), false)
            .await;

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OutcomeStatus::Success, OutcomeStatus::Failed, OutcomeStatus::Success]
        );
        assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::FetchFailed));
        assert_eq!(outcomes[1].stage, Stage::Extracting);
        assert_eq!(outcomes[0].record_id.as_deref(), Some("rec1"));
        assert_eq!(outcomes[2].record_id.as_deref(), Some("rec2"));

        // Published in input order.
        let published = sink.published.lock().unwrap();
        assert_eq!(published[0].source_url, "https://a.dev/1");
        assert_eq!(published[1].source_url, "https://c.dev/3");
    }

    #[tokio::test]
    async fn dry_run_never_publishes() {
        let sink = StubSink::default();
        let orch = orchestrator(PipelineOptions::default()).with_sink(Box::new(sink.clone()));

        let outcomes = orch.run(&urls(&["https://a.dev/1"]), true).await;

        assert_eq!(outcomes[0].status, OutcomeStatus::Skipped);
        let record = outcomes[0].record.as_ref().expect("record reported");
        assert_eq!(record.title, "Title of https://a.dev/1");
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_the_record_as_it_would_be_stored() {
        let long_url = format!("https://a.dev/{}", "segment/".repeat(9));
        let analyzer = ManualAnalyzer::new().with_defaults(crate::analyzer::AnalysisOverride {
            summary: Some("摘".repeat(300)),
            ..Default::default()
        });
        let sink = StubSink::default();
        let orch = Orchestrator::new(
            Box::new(StubSource),
            Box::new(analyzer),
            PipelineOptions::default(),
        )
        .with_sink(Box::new(sink.clone()));

        let dry = orch.run(&urls(&[&long_url]), true).await;
        let record = dry[0].record.as_ref().expect("record reported");
        assert_eq!(record.title.chars().count(), linkpub_shared::MAX_TITLE_CHARS);
        assert_eq!(record.summary.chars().count(), linkpub_shared::MAX_SUMMARY_CHARS);
        assert!(dry[0].notes.iter().any(|n| n.starts_with("title truncated")));
        assert!(dry[0].notes.iter().any(|n| n.starts_with("summary truncated")));

        // A real run hands the sink exactly what the dry run reported.
        let live = orch.run(&urls(&[&long_url]), false).await;
        assert!(live[0].is_success());
        let published = sink.published.lock().unwrap();
        assert_eq!(published[0].title, record.title);
        assert_eq!(published[0].summary, record.summary);
    }

    #[tokio::test]
    async fn publishing_without_sink_is_config_missing() {
        let orch = orchestrator(PipelineOptions::default())
            .with_sink_missing(vec!["FEISHU_APP_ID".into()]);

        let outcomes = orch.run(&urls(&["https://a.dev/1"]), false).await;
        assert_eq!(outcomes[0].error_kind(), Some(ErrorKind::ConfigMissing));
        assert!(outcomes[0].error.as_ref().unwrap().message.contains("FEISHU_APP_ID"));
        assert!(outcomes[0].record.is_some());
    }

    #[tokio::test]
    async fn cover_failure_is_not_fatal() {
        let sink = StubSink::default();
        let renderer = StubRenderer {
            fail: true,
            ..Default::default()
        };
        let orch = orchestrator(PipelineOptions::default())
            .with_renderer(Box::new(renderer))
            .with_sink(Box::new(sink.clone()));

        let outcomes = orch.run(&urls(&["https://a.dev/1"]), false).await;
        assert!(outcomes[0].is_success());
        assert!(outcomes[0].notes.iter().any(|n| n.starts_with("cover skipped")));
        assert!(sink.published.lock().unwrap()[0].cover_path.is_none());
    }

    #[tokio::test]
    async fn rejected_style_retries_with_fallback() {
        let renderer = StubRenderer {
            reject: vec!["swiss"],
            ..Default::default()
        };
        let styles = renderer.styles.clone();
        let orch = orchestrator(PipelineOptions::default()).with_renderer(Box::new(renderer));

        // "Title of ..." has no style keywords, so auto-selection picks swiss.
        let outcomes = orch.run(&urls(&["https://a.dev/1"]), true).await;

        assert_eq!(*styles.lock().unwrap(), vec!["swiss", "tech"]);
        let cover = outcomes[0].record.as_ref().unwrap().cover_path.clone();
        assert_eq!(cover, Some(PathBuf::from("output/tech.png")));
    }

    #[tokio::test]
    async fn covers_disabled_skip_renderer() {
        let renderer = StubRenderer::default();
        let styles = renderer.styles.clone();
        let options = PipelineOptions {
            generate_cover: false,
            ..Default::default()
        };
        let orch = orchestrator(options).with_renderer(Box::new(renderer));

        orch.run(&urls(&["https://a.dev/1"]), true).await;
        assert!(styles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_metadata_when_configured() {
        let options = PipelineOptions {
            continue_on_extract_failure: true,
            ..Default::default()
        };
        let orch = orchestrator(options);

        let outcomes = orch
            .run(&urls(&["https://broken.dev/post", "not a url"]), true)
            .await;

        assert_eq!(outcomes[0].status, OutcomeStatus::Skipped);
        assert_eq!(outcomes[0].record.as_ref().unwrap().title, "broken.dev");
        assert_eq!(outcomes[0].notes.len(), 1);

        // No domain to fall back on.
        assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
    }

    #[tokio::test]
    async fn invalid_analysis_fails_the_url() {
        let analyzer = ManualAnalyzer::new().with_defaults(crate::analyzer::AnalysisOverride {
            categories: vec!["未知".into()],
            ..Default::default()
        });
        let orch =
            Orchestrator::new(Box::new(StubSource), Box::new(analyzer), PipelineOptions::default());

        let outcomes = orch.run(&urls(&["https://a.dev/1"]), true).await;
        assert_eq!(outcomes[0].error_kind(), Some(ErrorKind::InvalidAnalysis));
        assert_eq!(outcomes[0].stage, Stage::Analyzing);
    }

    #[tokio::test]
    async fn publish_failure_keeps_record() {
        let sink = StubSink {
            reject: true,
            ..Default::default()
        };
        let orch = orchestrator(PipelineOptions::default()).with_sink(Box::new(sink));

        let outcomes = orch.run(&urls(&["https://a.dev/1", "https://c.dev/3"]), false).await;
        for outcome in &outcomes {
            assert_eq!(outcome.error_kind(), Some(ErrorKind::PermissionDenied));
            assert!(outcome.record.is_some());
        }
    }
}
