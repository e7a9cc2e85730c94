use async_trait::async_trait;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{escape_xml, TestReporter};
use crate::error::{CitrusError, CitrusResult};
use crate::testcase::{SuiteResult, TestStatus};

/// Writes `TEST-<suite>.xml` in JUnit format
pub struct JUnitReporter {
    directory: PathBuf,
}

impl JUnitReporter {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn seconds(millis: u64) -> String {
        format!("{:.3}", millis as f64 / 1000.0)
    }

    pub fn render(suite: &SuiteResult) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let suite_name = escape_xml(&suite.name);
        let _ = writeln!(
            xml,
            "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{}\" timestamp=\"{}\">",
            suite_name,
            suite.total(),
            suite.failed(),
            suite.skipped(),
            Self::seconds(suite.duration_ms),
            suite.started.format("%Y-%m-%dT%H:%M:%S"),
        );

        for result in &suite.results {
            let open = format!(
                "  <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
                escape_xml(&result.name),
                suite_name,
                Self::seconds(result.duration_ms)
            );
            match result.status {
                TestStatus::Success => {
                    let _ = writeln!(xml, "{}/>", open);
                }
                TestStatus::Skipped => {
                    let _ = writeln!(xml, "{}>\n    <skipped/>\n  </testcase>", open);
                }
                TestStatus::Failure => {
                    let message = result.error.as_deref().unwrap_or_default();
                    let error_type = result.error_code.map(|code| code.to_string()).unwrap_or_default();
                    let _ = writeln!(xml, "{}>", open);
                    let _ = writeln!(
                        xml,
                        "    <failure type=\"{}\" message=\"{}\">{}</failure>",
                        escape_xml(&error_type),
                        escape_xml(message),
                        escape_xml(&format!(
                            "Failed action: {}\n{}",
                            result.failed_action.as_deref().unwrap_or("unknown"),
                            message
                        ))
                    );
                    let _ = writeln!(xml, "  </testcase>");
                }
            }
        }
        xml.push_str("</testsuite>\n");
        xml
    }
}

#[async_trait]
impl TestReporter for JUnitReporter {
    fn name(&self) -> &str {
        "junit"
    }

    async fn on_suite_finish(&self, suite: &SuiteResult) -> CitrusResult<()> {
        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            CitrusError::runtime(format!(
                "Failed to create report directory '{}': {}",
                self.directory.display(),
                e
            ))
        })?;

        let path = self.directory.join(format!("TEST-{}.xml", suite.name));
        tokio::fs::write(&path, Self::render(suite)).await.map_err(|e| {
            CitrusError::runtime(format!("Failed to write JUnit report '{}': {}", path.display(), e))
        })?;
        info!(path = %path.display(), "JUnit report written");
        Ok(())
    }
}
