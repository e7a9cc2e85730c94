//! Test reporters notified by the runner.

mod json;
mod junit;
mod logging;

use async_trait::async_trait;

use crate::error::CitrusResult;
use crate::testcase::{SuiteResult, TestCase, TestResult};

pub use json::{JsonReporter, JSON_SUMMARY_FILE};
pub use junit::JUnitReporter;
pub use logging::LoggingReporter;

/// Receives lifecycle callbacks while a suite runs
#[async_trait]
pub trait TestReporter: Send + Sync {
    fn name(&self) -> &str;

    async fn on_suite_start(&self, _suite: &str) {}

    async fn on_test_start(&self, _test: &TestCase) {}

    async fn on_action_start(&self, _test: &TestCase, _action: &str) {}

    async fn on_test_finish(&self, _result: &TestResult) {}

    /// Called once all tests ran, file based reporters write their output here
    async fn on_suite_finish(&self, suite: &SuiteResult) -> CitrusResult<()>;
}

/// Escape text for XML attributes and content
pub(crate) fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CitrusError;

    pub(super) fn sample_suite() -> SuiteResult {
        let error = CitrusError::validation("Values not equal: expected <a> but was 'b'");
        SuiteResult {
            name: "orders".to_string(),
            started: chrono::Utc::now(),
            duration_ms: 1500,
            results: vec![
                TestResult::success("create-order", 1200),
                TestResult::failure("cancel-order", 300, &error, Some("receive".to_string())),
            ],
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("<a href=\"x\">Tom & Jerry's</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_junit_report() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JUnitReporter::new(dir.path());
        reporter.on_suite_finish(&sample_suite()).await.unwrap();

        let xml = std::fs::read_to_string(dir.path().join("TEST-orders.xml")).unwrap();
        assert!(xml.contains("<testsuite name=\"orders\" tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"create-order\" classname=\"orders\" time=\"1.200\"/>"));
        assert!(xml.contains("<failure type=\"validation_failed\""));
        assert!(xml.contains("expected &lt;a&gt; but was &apos;b&apos;"));
        roxmltree::Document::parse(&xml).unwrap();
    }

    #[tokio::test]
    async fn test_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JsonReporter::new(dir.path());
        reporter.on_suite_finish(&sample_suite()).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(JSON_SUMMARY_FILE)).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(summary["suite"], "orders");
        assert_eq!(summary["total"], 2);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["successPercentage"], 50.0);
        assert_eq!(summary["results"][1]["errorCode"], "validation_failed");
        assert_eq!(summary["results"][1]["failedAction"], "receive");
    }

    #[tokio::test]
    async fn test_logging_reporter_never_fails() {
        let reporter = LoggingReporter::default();
        reporter.on_suite_start("orders").await;
        assert!(reporter.on_suite_finish(&sample_suite()).await.is_ok());
    }
}
