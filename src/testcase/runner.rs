use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::events::{EventBus, TestEvent, TestEventKind};
use super::{SuiteResult, TestCase, TestResult};
use crate::actions::{ActionRef, CreateVariablesAction, TestAction};
use crate::context::{TestContext, TestContextFactory};
use crate::error::{CitrusError, CitrusResult};
use crate::report::{JUnitReporter, JsonReporter, LoggingReporter, TestReporter};
use crate::settings::CitrusConfig;

/// Executes test cases against a shared set of endpoints
pub struct TestRunner {
    factory: TestContextFactory,
    events: EventBus,
    reporters: Vec<Arc<dyn TestReporter>>,
}

impl TestRunner {
    pub fn new(factory: TestContextFactory) -> Self {
        Self {
            factory,
            events: EventBus::default(),
            reporters: Vec::new(),
        }
    }

    /// Runner with settings, global variables and components of a config file
    pub fn from_config(config: &CitrusConfig) -> CitrusResult<Self> {
        let factory = TestContextFactory::new(config.settings.clone())
            .with_global_variables(config.variables.clone());
        for definition in &config.endpoints {
            definition.create(&factory.endpoints, &factory.references)?;
        }
        info!(
            endpoints = factory.endpoints.names().len(),
            variables = factory.global_variables.len(),
            "Test runner configured"
        );
        Ok(Self::new(factory))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TestReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Logging reporter plus the file reporters enabled in the settings
    pub fn with_default_reporters(self) -> Self {
        let settings = Arc::clone(&self.factory.settings);
        let mut runner = self.with_reporter(Arc::new(LoggingReporter));
        if settings.junit_report {
            runner = runner.with_reporter(Arc::new(JUnitReporter::new(&settings.report_directory)));
        }
        if settings.json_report {
            runner = runner.with_reporter(Arc::new(JsonReporter::new(&settings.report_directory)));
        }
        runner
    }

    pub fn factory(&self) -> &TestContextFactory {
        &self.factory
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn publish(&self, kind: TestEventKind, source: &str, payload: serde_json::Value) {
        let receivers = self.events.publish(TestEvent::new(kind, source, payload)).await;
        debug!(kind = %kind, receivers, "Test event published");
    }

    /// Run actions in order and stop at the first failure, returning the failed action name
    async fn run_actions(
        &self,
        test: &TestCase,
        actions: &[ActionRef],
        context: &TestContext,
    ) -> Result<(), (String, CitrusError)> {
        for action in actions {
            let name = action.name().to_string();
            for reporter in &self.reporters {
                reporter.on_action_start(test, &name).await;
            }
            self.publish(TestEventKind::ActionStarted, &test.name, json!({ "action": name })).await;

            let outcome = action.execute(context).await;
            self.publish(
                TestEventKind::ActionFinished,
                &test.name,
                json!({ "action": name, "success": outcome.is_ok() }),
            )
            .await;
            outcome.map_err(|e| (name, e))?;
        }
        Ok(())
    }

    /// Run a single test, finally actions run whatever the outcome
    #[instrument(skip(self, test), fields(test = %test.name), level = "debug")]
    pub async fn run_test(&self, test: &TestCase) -> TestResult {
        let started = Instant::now();
        for reporter in &self.reporters {
            reporter.on_test_start(test).await;
        }
        self.publish(TestEventKind::TestStarted, &test.name, json!({ "author": test.author })).await;

        let context = self.factory.create_context(&test.name);
        let variables = CreateVariablesAction {
            variables: test.variables.clone(),
        };

        let mut outcome = match variables.execute(&context).await {
            Ok(()) => {
                let actions: Vec<ActionRef> = test.actions.iter().map(|a| a.build()).collect();
                self.run_actions(test, &actions, &context).await
            }
            Err(e) => Err((variables.name().to_string(), e)),
        };

        if !test.finally.is_empty() {
            debug!(test = %test.name, "Running finally actions");
            let finally: Vec<ActionRef> = test.finally.iter().map(|a| a.build()).collect();
            if let Err((action, e)) = self.run_actions(test, &finally, &context).await {
                if outcome.is_ok() {
                    outcome = Err((action, e));
                } else {
                    warn!(test = %test.name, action = %action, error = %e, "Finally action failed");
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(()) => TestResult::success(&test.name, duration_ms),
            Err((action, e)) => {
                error!(test = %test.name, action = %action, error = %e, "Test action failed");
                TestResult::failure(&test.name, duration_ms, &e, Some(action))
            }
        };

        for reporter in &self.reporters {
            reporter.on_test_finish(&result).await;
        }
        self.publish(TestEventKind::TestFinished, &test.name, json!({ "status": result.status })).await;
        result
    }

    /// Start auto start endpoints, run all tests, stop endpoints and write reports
    #[instrument(skip(self, tests), fields(tests = tests.len()), level = "debug")]
    pub async fn run_suite(&self, tests: &[TestCase]) -> CitrusResult<SuiteResult> {
        let suite_name = self.factory.settings.suite_name.clone();
        let started = chrono::Utc::now();
        let clock = Instant::now();

        for reporter in &self.reporters {
            reporter.on_suite_start(&suite_name).await;
        }
        self.publish(TestEventKind::SuiteStarted, &suite_name, json!({ "tests": tests.len() })).await;

        if let Err(e) = self.factory.endpoints.start_auto_start().await {
            self.factory.endpoints.stop_all().await;
            return Err(e);
        }

        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            results.push(self.run_test(test).await);
        }

        self.factory.endpoints.stop_all().await;

        let suite = SuiteResult {
            name: suite_name,
            started,
            duration_ms: clock.elapsed().as_millis() as u64,
            results,
        };
        self.publish(
            TestEventKind::SuiteFinished,
            &suite.name,
            json!({ "success": suite.success(), "failed": suite.failed() }),
        )
        .await;

        for reporter in &self.reporters {
            reporter.on_suite_finish(&suite).await?;
        }
        Ok(suite)
    }
}
