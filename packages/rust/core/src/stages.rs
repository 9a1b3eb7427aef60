//! Collaborator traits for the extract, cover and publish stages, with
//! implementations for the concrete crates.

use std::path::PathBuf;

use async_trait::async_trait;

use linkpub_cover::CoverGenerator;
use linkpub_extractor::Extractor;
use linkpub_publisher::{FeishuPublisher, PublishReceipt};
use linkpub_shared::{CoverSpec, ExtractedContent, LinkRecord, Result, TypeHint};

/// Stage 1: fetch and normalize a link.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, url: &str, hint: TypeHint) -> Result<ExtractedContent>;
}

/// Stage 3: render a cover image.
#[async_trait]
pub trait CoverRenderer: Send + Sync {
    async fn render(&self, spec: &CoverSpec) -> Result<PathBuf>;
}

/// Stage 4: persist a finished record.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn publish(&self, record: &LinkRecord) -> Result<PublishReceipt>;
}

#[async_trait]
impl ContentSource for Extractor {
    async fn fetch(&self, url: &str, hint: TypeHint) -> Result<ExtractedContent> {
        self.extract(url, hint).await
    }
}

#[async_trait]
impl CoverRenderer for CoverGenerator {
    async fn render(&self, spec: &CoverSpec) -> Result<PathBuf> {
        self.generate(spec).await
    }
}

#[async_trait]
impl RecordSink for FeishuPublisher {
    async fn publish(&self, record: &LinkRecord) -> Result<PublishReceipt> {
        FeishuPublisher::publish(self, record).await
    }
}
