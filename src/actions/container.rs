//! Container actions that run nested actions: loops, conditions, parallel
//! branches and error assertions.

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{execute_all, ActionRef, TestAction};
use crate::common::expression;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::validation::matcher;

/// Runs nested actions in order
pub struct SequentialAction {
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for SequentialAction {
    fn name(&self) -> &str {
        "sequential"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        execute_all(&self.actions, context).await
    }
}

/// Loop condition with the index variable replaced by its current value
fn check_condition(condition: &str, index_name: &str, index: usize, context: &TestContext) -> CitrusResult<bool> {
    let expression = expression::replace_index(condition, index_name, index);
    let expression = context.replace_dynamic_content(&expression)?;
    expression::evaluate(&expression)
}

/// Runs nested actions while the condition holds, e.g. `i lt 5`
pub struct IterateAction {
    pub index: String,
    pub start: usize,
    pub step: usize,
    pub condition: String,
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for IterateAction {
    fn name(&self) -> &str {
        "iterate"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let step = self.step.max(1);
        let mut index = self.start;
        while check_condition(&self.condition, &self.index, index, context)? {
            debug!(index, "Iteration");
            context.set_variable(&self.index, index.to_string())?;
            execute_all(&self.actions, context).await?;
            index += step;
        }
        Ok(())
    }
}

/// Runs nested actions until the condition becomes true, at least once
pub struct RepeatUntilTrueAction {
    pub index: String,
    pub start: usize,
    pub until: String,
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for RepeatUntilTrueAction {
    fn name(&self) -> &str {
        "repeat"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let mut index = self.start;
        loop {
            context.set_variable(&self.index, index.to_string())?;
            execute_all(&self.actions, context).await?;
            index += 1;
            if check_condition(&self.until, &self.index, index, context)? {
                return Ok(());
            }
        }
    }
}

/// Repeats nested actions after a failure until they pass or the
/// condition becomes true
pub struct RepeatOnErrorAction {
    pub index: String,
    pub start: usize,
    pub until: String,
    /// Pause between attempts in milliseconds
    pub auto_sleep: u64,
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for RepeatOnErrorAction {
    fn name(&self) -> &str {
        "repeat-on-error"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let mut index = self.start;
        loop {
            context.set_variable(&self.index, index.to_string())?;
            let err = match execute_all(&self.actions, context).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if check_condition(&self.until, &self.index, index, context)? {
                warn!(index, "Repeat condition reached, giving up");
                return Err(err);
            }

            info!("Caught error in repeat on error container: {}", err);
            if self.auto_sleep > 0 {
                info!("Sleeping {} ms before next attempt", self.auto_sleep);
                tokio::time::sleep(Duration::from_millis(self.auto_sleep)).await;
            }
            index += 1;
        }
    }
}

/// Runs nested actions only when the expression is true
pub struct ConditionalAction {
    pub when: String,
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for ConditionalAction {
    fn name(&self) -> &str {
        "conditional"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let expression = context.replace_dynamic_content(&self.when)?;
        if expression::evaluate(&expression)? {
            execute_all(&self.actions, context).await
        } else {
            info!("Condition '{}' not satisfied, skipping nested actions", expression);
            Ok(())
        }
    }
}

/// Runs nested actions concurrently; all of them complete before the
/// first error is reported
pub struct ParallelAction {
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for ParallelAction {
    fn name(&self) -> &str {
        "parallel"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let results = join_all(self.actions.iter().map(|action| action.execute(context))).await;

        let mut errors: Vec<CitrusError> = results.into_iter().filter_map(Result::err).collect();
        for err in &errors {
            warn!(error = %err, "Parallel action failed");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }
}

/// Whether an error has the expected code name, e.g. `validation_failed`
fn matches_type(err: &CitrusError, expected: Option<&str>) -> bool {
    expected.map_or(true, |expected| err.code().to_string() == expected)
}

/// Expects the nested action to fail with the given error
pub struct AssertAction {
    /// Expected error code
    pub error_type: Option<String>,
    /// Expected error message, may use validation matchers
    pub message: Option<String>,
    pub action: ActionRef,
}

#[async_trait]
impl TestAction for AssertAction {
    fn name(&self) -> &str {
        "assert"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let err = match self.action.execute(context).await {
            Ok(()) => {
                return Err(CitrusError::Assertion(format!(
                    "Missing asserted error '{}'",
                    self.error_type.as_deref().unwrap_or("any")
                )))
            }
            Err(e) => e,
        };

        info!("Validating caught error: {}", err);
        if !matches_type(&err, self.error_type.as_deref()) {
            return Err(CitrusError::Assertion(format!(
                "Error type mismatch, expected '{}' but was '{}': {}",
                self.error_type.as_deref().unwrap_or_default(),
                err.code(),
                err
            )));
        }

        if let Some(expected) = &self.message {
            matcher::validate_value("error message", &err.to_string(), expected, context).map_err(|_| {
                CitrusError::Assertion(format!(
                    "Error message mismatch, expected '{}' but was '{}'",
                    expected, err
                ))
            })?;
        }

        info!("Assert error validation: All values OK");
        Ok(())
    }
}

/// Swallows errors of nested actions
pub struct CatchAction {
    pub error_type: Option<String>,
    pub actions: Vec<ActionRef>,
}

#[async_trait]
impl TestAction for CatchAction {
    fn name(&self) -> &str {
        "catch"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        for action in &self.actions {
            if let Err(e) = action.execute(context).await {
                if !matches_type(&e, self.error_type.as_deref()) {
                    return Err(e);
                }
                info!("Caught error: {}", e);
            }
        }
        Ok(())
    }
}
