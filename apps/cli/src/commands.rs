//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use linkpub_core::{
    AnalysisOverride, BatchReport, ManualAnalyzer, Orchestrator, PipelineOptions,
    ProgressReporter, RecordSink, load_analyses, load_record_entries, publish_records,
};
use linkpub_cover::{CATALOGUE, CoverGenerator, auto_select_style};
use linkpub_extractor::{Extractor, parse_target};
use linkpub_publisher::{FeishuPublisher, REQUIRED_SCOPES};
use linkpub_shared::{
    AppConfig, Category, CategorySet, CoverSpec, FeishuCredentials, LinkPubError, LinkRecord,
    OutcomeStatus, RunOutcome, Stage, TypeHint, config_file_path, init_config, load_config,
    mask_secret,
};

/// Name of the batch report written into the output directory.
const RESULTS_FILE: &str = "results.json";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// linkpub: collect links into a Feishu Bitable.
#[derive(Parser)]
#[command(
    name = "linkpub",
    version,
    about = "Extract, summarize, illustrate and publish links to a Feishu Bitable.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.linkpub/linkpub.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for one URL.
    Process(ProcessArgs),

    /// Run the full pipeline for many URLs and write results.json.
    Batch(BatchArgs),

    /// Extract a URL and print the normalized content as JSON.
    Fetch {
        /// URL to extract.
        #[arg(long)]
        url: String,

        /// Extraction strategy: auto, webpage, github, wechat or article.
        #[arg(long = "type", default_value = "auto")]
        type_hint: TypeHint,

        /// Write the JSON to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a cover image.
    Cover(CoverArgs),

    /// Publish a hand-written record.
    Publish(PublishArgs),

    /// Check configuration, Feishu credentials and the table schema.
    CheckEnv,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Analysis values supplied on the command line.
#[derive(Args, Debug, Default)]
pub(crate) struct AnalysisArgs {
    /// Title (defaults to the extracted title).
    #[arg(long)]
    pub title: Option<String>,

    /// Summary (defaults to the start of the body text).
    #[arg(long)]
    pub summary: Option<String>,

    /// Categories, comma-separated (1 to 3).
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Cover style (defaults to keyword auto-selection).
    #[arg(long)]
    pub style: Option<String>,
}

impl AnalysisArgs {
    fn into_override(self) -> AnalysisOverride {
        AnalysisOverride {
            title: self.title,
            summary: self.summary,
            categories: self.categories,
            cover_style: self.style,
            ..Default::default()
        }
    }
}

/// Options shared by `process` and `batch`.
#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Extraction strategy: auto, webpage, github, wechat or article.
    #[arg(long = "type", default_value = "auto")]
    pub type_hint: TypeHint,

    /// Sharer name written to the record.
    #[arg(long)]
    pub sharer: Option<String>,

    /// Skip cover generation.
    #[arg(long)]
    pub no_cover: bool,

    /// Run every stage except publishing.
    #[arg(long)]
    pub dry_run: bool,

    /// Output directory for covers (and results.json in batch mode).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn options(&self, config: &AppConfig) -> PipelineOptions {
        let mut options = PipelineOptions::from_config(config);
        options.type_hint = self.type_hint;
        options.sharer = self.sharer.clone();
        if self.no_cover {
            options.generate_cover = false;
        }
        if let Some(dir) = &self.output {
            options.output_dir = dir.clone();
        }
        options
    }
}

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// URL to process.
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// URLs, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub urls: Vec<String>,

    /// File with one URL per line (`#` starts a comment).
    #[arg(long)]
    pub url_file: Option<PathBuf>,

    /// JSON array of per-URL analyses (title, summary, categories, style, score).
    #[arg(long)]
    pub json_file: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub(crate) struct CoverArgs {
    /// Cover title.
    #[arg(long, required_unless_present = "list_styles")]
    pub title: Option<String>,

    /// Subtitle (defaults to the configured one).
    #[arg(long)]
    pub subtitle: Option<String>,

    /// Style key (defaults to keyword auto-selection).
    #[arg(long)]
    pub style: Option<String>,

    /// Categories used for auto-selection, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// List the available styles and exit.
    #[arg(long)]
    pub list_styles: bool,
}

#[derive(Args, Debug)]
pub(crate) struct PublishArgs {
    #[arg(long, required_unless_present = "json")]
    pub title: Option<String>,

    /// Source link.
    #[arg(long, required_unless_present = "json")]
    pub url: Option<String>,

    #[arg(long, required_unless_present = "json")]
    pub summary: Option<String>,

    /// Categories, comma-separated (defaults to 其他).
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Cover image to attach.
    #[arg(long)]
    pub cover: Option<PathBuf>,

    #[arg(long)]
    pub sharer: Option<String>,

    /// JSON array of ready-made records (title, url, summary, categories,
    /// cover, sharer) to publish in order.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["title", "url", "summary"])]
    pub json: Option<PathBuf>,

    /// Print the record instead of publishing it.
    #[arg(long)]
    pub dry_run: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration with secrets masked.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "linkpub=info",
        1 => "linkpub=debug",
        _ => "linkpub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        config, command, ..
    } = cli;
    let config_path = config.as_deref();

    match command {
        Command::Process(args) => cmd_process(&load_config(config_path)?, args).await,
        Command::Batch(args) => cmd_batch(&load_config(config_path)?, args).await,
        Command::Fetch {
            url,
            type_hint,
            output,
        } => cmd_fetch(&load_config(config_path)?, &url, type_hint, output.as_deref()).await,
        Command::Cover(args) => cmd_cover(&load_config(config_path)?, args).await,
        Command::Publish(args) => cmd_publish(&load_config(config_path)?, args).await,
        Command::CheckEnv => cmd_check_env(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_process(config: &AppConfig, args: ProcessArgs) -> Result<()> {
    let options = args.run.options(config);
    let url = process_target(&args);
    let analyzer = ManualAnalyzer::new().with_defaults(args.analysis.into_override());

    let progress = CliProgress::new();
    let spinner = progress.handle();
    let orchestrator = build_orchestrator(config, options, analyzer, progress, args.run.dry_run)?;

    info!(%url, dry_run = args.run.dry_run, "processing link");
    let outcomes = orchestrator.run(std::slice::from_ref(&url), args.run.dry_run).await;
    spinner.finish_and_clear();

    for outcome in &outcomes {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }

    if let Some(err) = outcomes.iter().find_map(|o| o.error.as_ref()) {
        bail!("{}: {}", err.kind, err.message);
    }
    Ok(())
}

/// The URL as typed, without surrounding whitespace.
fn process_target(args: &ProcessArgs) -> String {
    args.url.trim().to_string()
}

async fn cmd_batch(config: &AppConfig, args: BatchArgs) -> Result<()> {
    let mut urls: Vec<String> = args
        .urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(path) = &args.url_file {
        urls.extend(read_url_file(path)?);
    }
    if urls.is_empty() {
        bail!("no URLs given: use --urls or --url-file");
    }

    let analyzer = match &args.json_file {
        Some(path) => ManualAnalyzer::from_entries(&urls, load_analyses(path)?),
        None => ManualAnalyzer::new(),
    };

    let options = args.run.options(config);
    let results_path = options.output_dir.join(RESULTS_FILE);

    let progress = CliProgress::new();
    let spinner = progress.handle();
    let orchestrator = build_orchestrator(config, options, analyzer, progress, args.run.dry_run)?;

    info!(count = urls.len(), dry_run = args.run.dry_run, "processing batch");
    let outcomes = orchestrator.run(&urls, args.run.dry_run).await;
    spinner.finish_and_clear();

    let report = BatchReport::new(outcomes, args.run.dry_run);
    report.write_json(&results_path)?;

    println!();
    println!("  Total:     {}", report.total);
    println!("  Succeeded: {}", report.succeeded);
    if report.dry_run {
        println!("  Skipped:   {} (dry run)", report.skipped);
    }
    println!("  Failed:    {}", report.failed);
    println!("  Results:   {}", results_path.display());
    println!();

    if !report.all_succeeded() {
        bail!("{} of {} URLs failed", report.failed, report.total);
    }
    Ok(())
}

/// Wire the concrete stages into an orchestrator. Missing Feishu
/// credentials leave it without a sink.
fn build_orchestrator(
    config: &AppConfig,
    options: PipelineOptions,
    analyzer: ManualAnalyzer,
    progress: CliProgress,
    dry_run: bool,
) -> Result<Orchestrator> {
    let generate_cover = options.generate_cover;
    let mut orchestrator =
        Orchestrator::new(Box::new(Extractor::new(config)?), Box::new(analyzer), options)
        .with_progress(Box::new(progress));

    if generate_cover {
        orchestrator = orchestrator.with_renderer(Box::new(CoverGenerator::new(&config.cover)));
    }

    orchestrator = match FeishuCredentials::from_config(&config.feishu) {
        Ok(credentials) => orchestrator.with_sink(Box::new(FeishuPublisher::new(credentials)?)),
        Err(LinkPubError::ConfigMissing { missing }) => {
            if !dry_run {
                warn!(?missing, "Feishu credentials not configured; records will not be published");
            }
            orchestrator.with_sink_missing(missing)
        }
        Err(e) => return Err(e.into()),
    };

    Ok(orchestrator)
}

/// One URL per line; blank lines and `#` comments are skipped.
fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read URL file {}", path.display()))?;
    Ok(parse_url_lines(&text))
}

fn parse_url_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Single-stage commands
// ---------------------------------------------------------------------------

async fn cmd_fetch(
    config: &AppConfig,
    url: &str,
    type_hint: TypeHint,
    output: Option<&Path>,
) -> Result<()> {
    let extractor = Extractor::new(config)?;
    let content = extractor.extract(url, type_hint).await?;
    let json = serde_json::to_string_pretty(&content)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_cover(config: &AppConfig, args: CoverArgs) -> Result<()> {
    if args.list_styles {
        for info in &CATALOGUE {
            println!(
                "  {:<12} {}  [{}]",
                info.style.as_str(),
                info.display_name,
                info.keywords.join(", ")
            );
        }
        return Ok(());
    }

    let Some(title) = args.title else {
        bail!("--title is required");
    };

    let style = match args.style {
        Some(style) => style,
        None => {
            let categories = parse_categories(&args.categories)?;
            auto_select_style(&title, categories.as_slice()).as_str().to_string()
        }
    };
    let output_dir = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.cover.output_dir));

    let mut spec = CoverSpec::new(title, style, output_dir);
    spec.subtitle = args.subtitle.unwrap_or_else(|| config.cover.subtitle.clone());

    let path = CoverGenerator::new(&config.cover).generate(&spec).await?;
    println!("{}", path.display());
    Ok(())
}

async fn cmd_publish(config: &AppConfig, args: PublishArgs) -> Result<()> {
    if let Some(path) = &args.json {
        return cmd_publish_file(config, path, args.dry_run).await;
    }
    let (Some(title), Some(url), Some(summary)) = (args.title, args.url, args.summary) else {
        bail!("--title, --url and --summary are required without --json");
    };

    let url = parse_target(&url)?;
    let record = LinkRecord {
        source_url: url.to_string(),
        title,
        summary,
        categories: parse_categories(&args.categories)?,
        sharer: args.sharer,
        created_at: Utc::now(),
        cover_path: args.cover,
    };

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let publisher = FeishuPublisher::new(FeishuCredentials::from_config(&config.feishu)?)?;
    let receipt = publisher.publish(&record).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

/// Publish every record of a records file and print the batch report.
async fn cmd_publish_file(config: &AppConfig, path: &Path, dry_run: bool) -> Result<()> {
    let entries = load_record_entries(path)?;
    let publisher = if dry_run {
        None
    } else {
        Some(FeishuPublisher::new(FeishuCredentials::from_config(&config.feishu)?)?)
    };

    let progress = CliProgress::new();
    let spinner = progress.handle();
    info!(count = entries.len(), dry_run, "publishing records file");
    let outcomes = publish_records(
        entries,
        publisher.as_ref().map(|p| p as &dyn RecordSink),
        &progress,
    )
    .await;
    spinner.finish_and_clear();

    let report = BatchReport::new(outcomes, dry_run);
    println!("{}", report.to_json()?);

    if !report.all_succeeded() {
        bail!("{} of {} records failed", report.failed, report.total);
    }
    Ok(())
}

/// Labels to a category set; none means 其他.
fn parse_categories(labels: &[String]) -> Result<CategorySet> {
    let labels: Vec<&str> = labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    if labels.is_empty() {
        return Ok(CategorySet::single(Category::Other));
    }
    Ok(CategorySet::parse(&labels)?)
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

async fn cmd_check_env(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut failures = 0usize;

    let file = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("Configuration");
    println!(
        "  file:        {} ({})",
        file.display(),
        if file.exists() { "found" } else { "not found, using defaults" }
    );
    match &config.reader.api_key {
        Some(key) => println!("  reader key:  {}", mask_secret(key)),
        None => println!("  reader key:  not set (anonymous rate limits apply)"),
    }
    match find_executable(&config.cover.command) {
        Some(path) => println!("  cover tool:  {}", path.display()),
        None => println!(
            "  cover tool:  '{}' not found; covers will be skipped",
            config.cover.command
        ),
    }

    println!();
    println!("Feishu");
    match FeishuCredentials::from_config(&config.feishu) {
        Ok(credentials) => {
            println!("  app id:      {}", mask_secret(&credentials.app_id));
            let publisher = FeishuPublisher::new(credentials)?;
            println!("  app token:   {}", publisher.app_token());

            match publisher.check_auth().await {
                Ok(()) => {
                    println!("  ✓ tenant access token obtained");
                    match publisher.check_schema().await {
                        Ok(table) => println!(
                            "  ✓ table {} has all {} expected fields",
                            table.table_id,
                            linkpub_publisher::EXPECTED_FIELDS.len()
                        ),
                        Err(e) => {
                            println!("  ✗ table check failed: {e}");
                            failures += 1;
                        }
                    }
                }
                Err(e) => {
                    println!("  ✗ authentication failed: {e}");
                    failures += 1;
                }
            }
        }
        Err(LinkPubError::ConfigMissing { missing }) => {
            println!("  ✗ missing: {}", missing.join(", "));
            failures += 1;
        }
        Err(e) => return Err(e.into()),
    }

    println!();
    println!("Required app scopes: {}", REQUIRED_SCOPES.join(", "));

    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    Ok(())
}

/// Resolve a command the way the shell would: paths as-is, bare names on `PATH`.
fn find_executable(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|path| path.is_file())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file created at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config.masked())
        .wrap_err("failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the current URL and stage; finished URLs are printed
/// above it.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    /// A handle for finishing the spinner after the orchestrator owns `self`.
    fn handle(&self) -> ProgressBar {
        self.spinner.clone()
    }
}

impl ProgressReporter for CliProgress {
    fn url_started(&self, url: &str, index: usize, total: usize) {
        self.spinner.set_prefix(format!("[{index}/{total}]"));
        self.spinner.set_message(url.to_string());
    }

    fn stage(&self, url: &str, stage: Stage) {
        self.spinner.set_message(format!("{} {url}", stage_label(stage)));
    }

    fn url_finished(&self, outcome: &RunOutcome) {
        self.spinner.println(outcome_line(outcome));
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Pending => "Waiting",
        Stage::Extracting => "Extracting",
        Stage::Analyzing => "Analyzing",
        Stage::CoverGenerating => "Rendering cover for",
        Stage::Publishing => "Publishing",
        Stage::Done => "Done",
    }
}

fn outcome_line(outcome: &RunOutcome) -> String {
    let detail = match (&outcome.status, &outcome.error, &outcome.record_id) {
        (OutcomeStatus::Failed, Some(err), _) => format!("{}: {}", err.kind, err.message),
        (_, _, Some(record_id)) => format!("record {record_id}"),
        (OutcomeStatus::Skipped, _, _) => "dry run, not published".to_string(),
        _ => String::new(),
    };
    let mark = match outcome.status {
        OutcomeStatus::Success => "✓",
        OutcomeStatus::Skipped => "-",
        OutcomeStatus::Failed => "✗",
    };
    let mut line = format!("  {mark} {}  {detail}", outcome.url);
    for note in &outcome.notes {
        line.push_str(&format!("\n      note: {note}"));
    }
    line
}
