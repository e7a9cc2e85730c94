use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use super::TestReporter;
use crate::error::{CitrusError, CitrusResult};
use crate::testcase::SuiteResult;

pub const JSON_SUMMARY_FILE: &str = "citrus-summary.json";

/// Writes a JSON summary of the suite
pub struct JsonReporter {
    directory: PathBuf,
}

impl JsonReporter {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn summary(suite: &SuiteResult) -> serde_json::Value {
        json!({
            "suite": suite.name,
            "started": suite.started,
            "durationMs": suite.duration_ms,
            "total": suite.total(),
            "success": suite.success(),
            "failed": suite.failed(),
            "skipped": suite.skipped(),
            "successPercentage": suite.success_percentage(),
            "failedPercentage": suite.failed_percentage(),
            "results": suite.results,
        })
    }
}

#[async_trait]
impl TestReporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    async fn on_suite_finish(&self, suite: &SuiteResult) -> CitrusResult<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(JSON_SUMMARY_FILE);
        let content = serde_json::to_string_pretty(&Self::summary(suite))?;
        tokio::fs::write(&path, content).await.map_err(|e| {
            CitrusError::runtime(format!("Failed to write JSON summary '{}': {}", path.display(), e))
        })?;
        info!(path = %path.display(), "JSON summary written");
        Ok(())
    }
}
