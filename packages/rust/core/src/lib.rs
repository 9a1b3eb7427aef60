//! Pipeline orchestration for linkpub.
//!
//! This crate ties extraction, analysis, cover rendering and publishing into
//! a sequential per-URL pipeline with batch reporting, and publishes
//! ready-made records files.

pub mod analyzer;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod stages;

pub use analyzer::{AnalysisOverride, Analyzer, ManualAnalyzer, load_analyses};
pub use pipeline::{Orchestrator, PipelineOptions, ProgressReporter, SilentProgress};
pub use records::{RecordEntry, load_record_entries, publish_records};
pub use report::BatchReport;
pub use stages::{ContentSource, CoverRenderer, RecordSink};
