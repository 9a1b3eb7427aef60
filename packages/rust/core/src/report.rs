//! Batch summary written to `results.json`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use linkpub_shared::{LinkPubError, OutcomeStatus, Result, RunOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<RunOutcome>,
}

impl BatchReport {
    pub fn new(outcomes: Vec<RunOutcome>, dry_run: bool) -> Self {
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            generated_at: Utc::now(),
            dry_run,
            total: outcomes.len(),
            succeeded: count(OutcomeStatus::Success),
            skipped: count(OutcomeStatus::Skipped),
            failed: count(OutcomeStatus::Failed),
            outcomes,
        }
    }

    /// True when no URL failed. Dry-run skips count as success.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LinkPubError::config(format!("failed to serialize report: {e}")))
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LinkPubError::io(parent, e))?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| LinkPubError::io(path, e))?;
        info!(path = %path.display(), "batch report written");
        Ok(())
    }
}
