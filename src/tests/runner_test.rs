//! Unit tests for the test runner

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{CitrusResult, ErrorCode};
use crate::report::TestReporter;
use crate::settings::{CitrusConfig, CitrusSettings};
use crate::testcase::{SuiteResult, TestCase, TestEventKind, TestResult, TestRunner, TestStatus};
use crate::TestContextFactory;

/// Reporter that records every callback
#[derive(Default)]
struct RecordingReporter {
    calls: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestReporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_suite_start(&self, suite: &str) {
        self.record(format!("suite-start:{}", suite));
    }

    async fn on_test_start(&self, test: &TestCase) {
        self.record(format!("test-start:{}", test.name));
    }

    async fn on_action_start(&self, _test: &TestCase, action: &str) {
        self.record(format!("action:{}", action));
    }

    async fn on_test_finish(&self, result: &TestResult) {
        self.record(format!("test-finish:{}:{}", result.name, result.status));
    }

    async fn on_suite_finish(&self, suite: &SuiteResult) -> CitrusResult<()> {
        self.record(format!("suite-finish:{}:{}", suite.success(), suite.failed()));
        Ok(())
    }
}

fn runner(suite: &str) -> TestRunner {
    let settings = CitrusSettings {
        suite_name: suite.to_string(),
        ..CitrusSettings::default()
    };
    TestRunner::new(TestContextFactory::new(settings))
}

#[tokio::test]
async fn test_run_test_resolves_variables_in_order() {
    let test = TestCase::from_yaml(
        r#"
name: greeting-test
variables:
  - name: user
    value: Citrus
  - name: greeting
    value: "Hello ${user}"
actions:
  - send:
      endpoint: direct:greetings
      message:
        body:
          data: '{"greeting": "${greeting}"}'
  - receive:
      endpoint: direct:greetings
      timeout: 1000
      message:
        body:
          data: '{"greeting": "Hello Citrus"}'
"#,
    )
    .unwrap();

    let result = runner("unit").run_test(&test).await;
    assert_eq!(result.status, TestStatus::Success, "{:?}", result.error);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_failure_runs_finally_and_keeps_first_error() {
    let failing = TestCase::from_yaml(
        r#"
name: failing-test
actions:
  - echo:
      message: "before failure"
  - fail:
      message: "Order ${citrus.test.name} rejected"
  - echo:
      message: "never reached"
finally:
  - send:
      endpoint: direct:cleanup
      message:
        body:
          data: '{"status": "cleaned"}'
  - fail:
      message: "finally failure"
"#,
    )
    .unwrap();
    let verifying = TestCase::from_yaml(
        r#"
name: verifying-test
actions:
  - receive:
      endpoint: direct:cleanup
      timeout: 1000
      message:
        body:
          data: '{"status": "cleaned"}'
"#,
    )
    .unwrap();

    let reporter = Arc::new(RecordingReporter::default());
    let runner = runner("cleanup-suite").with_reporter(reporter.clone());
    let suite = runner.run_suite(&[failing, verifying]).await.unwrap();

    assert_eq!(suite.name, "cleanup-suite");
    assert_eq!(suite.failed(), 1);
    assert_eq!(suite.success(), 1);

    let failed = &suite.results[0];
    assert_eq!(failed.failed_action.as_deref(), Some("fail"));
    assert_eq!(failed.error_code, Some(ErrorCode::Failed));
    assert!(failed.error.as_deref().unwrap().contains("Order failing-test rejected"));

    let calls = reporter.calls();
    assert_eq!(calls.first().unwrap(), "suite-start:cleanup-suite");
    assert_eq!(calls.iter().filter(|c| *c == "action:echo").count(), 1);
    assert!(calls.contains(&"test-finish:failing-test:FAILED".to_string()));
    assert!(calls.contains(&"test-finish:verifying-test:SUCCESS".to_string()));
    assert_eq!(calls.last().unwrap(), "suite-finish:1:1");
}

#[tokio::test]
async fn test_finally_failure_fails_passing_test() {
    let test = TestCase::from_yaml(
        r#"
name: finally-test
actions:
  - echo:
      message: "all good"
finally:
  - fail:
      message: "cleanup failed"
"#,
    )
    .unwrap();

    let result = runner("unit").run_test(&test).await;
    assert_eq!(result.status, TestStatus::Failure);
    assert_eq!(result.error.as_deref(), Some("cleanup failed"));
}

#[tokio::test]
async fn test_unknown_variable_fails_before_actions() {
    let test = TestCase::from_yaml(
        r#"
name: variable-test
variables:
  - name: greeting
    value: "Hello ${missing}"
actions:
  - echo:
      message: "${greeting}"
"#,
    )
    .unwrap();

    let result = runner("unit").run_test(&test).await;
    assert_eq!(result.error_code, Some(ErrorCode::UnknownVariable));
    assert_eq!(result.failed_action.as_deref(), Some("create-variables"));
}

#[tokio::test]
async fn test_runner_publishes_lifecycle_events() {
    let test = TestCase::from_yaml("name: event-test\nactions:\n  - echo:\n      message: hi\n").unwrap();
    let runner = runner("events");
    let mut rx = runner.events().subscribe();

    runner.run_suite(&[test]).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            TestEventKind::SuiteStarted,
            TestEventKind::TestStarted,
            TestEventKind::ActionStarted,
            TestEventKind::ActionFinished,
            TestEventKind::TestFinished,
            TestEventKind::SuiteFinished,
        ]
    );
}

#[tokio::test]
async fn test_from_config_registers_endpoints_and_globals() {
    let config: CitrusConfig = serde_yaml::from_str(
        r#"
settings:
  suiteName: configured
variables:
  region: eu
endpoints:
  - type: direct
    name: orders
"#,
    )
    .unwrap();
    let runner = TestRunner::from_config(&config).unwrap();
    assert!(runner.factory().endpoints.contains("orders"));

    let context = runner.factory().create_context("t");
    assert_eq!(context.get_variable("region").unwrap(), "eu");
    assert_eq!(runner.factory().settings.suite_name, "configured");
}
