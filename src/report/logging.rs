use async_trait::async_trait;
use tracing::{debug, error, info};

use super::TestReporter;
use crate::error::CitrusResult;
use crate::testcase::{SuiteResult, TestCase, TestResult, TestStatus};

const SEPARATOR: &str = "------------------------------------------------------------------------";

/// Prints progress banners through tracing
#[derive(Debug, Default)]
pub struct LoggingReporter;

#[async_trait]
impl TestReporter for LoggingReporter {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_suite_start(&self, suite: &str) {
        info!("{}", SEPARATOR);
        info!("       .__  __                       ");
        info!("  ____ |__|/  |________ __ __  ______");
        info!("_/ ___\\|  \\   __\\_  __ \\  |  \\/  ___/");
        info!("\\  \\___|  ||  |  |  | \\/  |  /\\___ \\ ");
        info!(" \\___  >__||__|  |__|  |____//____  >");
        info!("     \\/                           \\/");
        info!("{}", SEPARATOR);
        info!(suite = %suite, "BEFORE TEST SUITE: SUCCESS");
    }

    async fn on_test_start(&self, test: &TestCase) {
        info!("{}", SEPARATOR);
        info!(test = %test.name, author = test.author.as_deref().unwrap_or("unknown"), "STARTING TEST {}", test.name);
        if let Some(description) = &test.description {
            debug!(test = %test.name, "{}", description);
        }
    }

    async fn on_action_start(&self, test: &TestCase, action: &str) {
        info!(test = %test.name, "TEST STEP: {}", action);
    }

    async fn on_test_finish(&self, result: &TestResult) {
        match result.status {
            TestStatus::Failure => error!(
                test = %result.name,
                duration_ms = result.duration_ms,
                error = result.error.as_deref().unwrap_or_default(),
                "TEST FAILED {}",
                result.name
            ),
            status => info!(test = %result.name, duration_ms = result.duration_ms, "TEST {} {}", status, result.name),
        }
        info!("{}", SEPARATOR);
    }

    async fn on_suite_finish(&self, suite: &SuiteResult) -> CitrusResult<()> {
        info!("{}", SEPARATOR);
        info!("CITRUS TEST RESULTS");
        for result in &suite.results {
            match &result.error {
                Some(reason) => error!(" {} ... {} ({})", result.name, result.status, reason),
                None => info!(" {} ... {}", result.name, result.status),
            }
        }
        info!(
            "TOTAL: {}  SUCCESS: {} ({}%)  FAILED: {} ({}%)  SKIPPED: {}",
            suite.total(),
            suite.success(),
            suite.success_percentage(),
            suite.failed(),
            suite.failed_percentage(),
            suite.skipped()
        );
        info!("{}", SEPARATOR);
        Ok(())
    }
}
