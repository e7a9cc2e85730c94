//! YAML test action model.
//!
//! Every test action is written as a single-key map, the key naming the
//! action:
//!
//! ```yaml
//! - echo:
//!     message: "Hello ${user}"
//! - iterate:
//!     condition: i lt 3
//!     actions:
//!       - send:
//!           endpoint: direct:orders
//!           message:
//!             body:
//!               data: '{"order": ${i}}'
//! ```
//!
//! Definitions are turned into executable [`ActionRef`]s with [`ActionDefinition::build`].

pub mod builder;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::actions::http::HttpAction;
use crate::actions::{
    ActionRef, AssertAction, CatchAction, ConditionalAction, CreateVariablesAction, EchoAction, FailAction,
    IterateAction, ParallelAction, PurgeEndpointAction, ReceiveMessageAction, RepeatOnErrorAction,
    RepeatUntilTrueAction, SendMessageAction, SequentialAction, SleepAction, StartServerAction, StopServerAction,
    TraceVariablesAction, WaitForAction,
};
use crate::kubernetes::KubernetesAction;
use crate::selenium::SeleniumAction;
use crate::sql::{ExecuteSqlAction, SqlQueryAction};

pub use builder::*;

const DEFAULT_INDEX_NAME: &str = "i";
const DEFAULT_AUTO_SLEEP_MS: u64 = 1000;

fn default_index() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_start() -> usize {
    1
}

fn default_step() -> usize {
    1
}

fn default_auto_sleep() -> u64 {
    DEFAULT_AUTO_SLEEP_MS
}

/// Nested actions run in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SequentialDefinition {
    pub actions: Vec<ActionDefinition>,
}

/// Loop while `condition` holds, e.g. `i lt 5`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct IterateDefinition {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_start")]
    pub start: usize,
    #[serde(default = "default_step")]
    pub step: usize,
    pub condition: String,
    pub actions: Vec<ActionDefinition>,
}

/// Repeat until `until` becomes true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RepeatDefinition {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_start")]
    pub start: usize,
    pub until: String,
    pub actions: Vec<ActionDefinition>,
}

/// Repeat failing actions until they pass or `until` becomes true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepeatOnErrorDefinition {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_start")]
    pub start: usize,
    pub until: String,
    #[serde(default = "default_auto_sleep")]
    pub auto_sleep: u64,
    pub actions: Vec<ActionDefinition>,
}

/// Actions executed only when the expression is true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ConditionalDefinition {
    pub when: String,
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ParallelDefinition {
    pub actions: Vec<ActionDefinition>,
}

/// Expect the nested action to fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AssertDefinition {
    /// Error code such as `validation_failed` or `message_timeout`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub action: Box<ActionDefinition>,
}

/// Swallow errors of the nested actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CatchDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub actions: Vec<ActionDefinition>,
}

/// A test action as written in a YAML test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ActionDefinition {
    Echo(EchoAction),
    Sleep(SleepAction),
    CreateVariables(CreateVariablesAction),
    TraceVariables(TraceVariablesAction),
    Fail(FailAction),
    Send(SendMessageAction),
    Receive(ReceiveMessageAction),
    Purge(PurgeEndpointAction),
    Start(StartServerAction),
    Stop(StopServerAction),
    WaitFor(WaitForAction),
    Http(HttpAction),
    Sql(ExecuteSqlAction),
    SqlQuery(SqlQueryAction),
    Kubernetes(KubernetesAction),
    Selenium(SeleniumAction),
    Sequential(SequentialDefinition),
    Iterate(IterateDefinition),
    Repeat(RepeatDefinition),
    RepeatOnError(RepeatOnErrorDefinition),
    Conditional(ConditionalDefinition),
    Parallel(ParallelDefinition),
    Assert(AssertDefinition),
    Catch(CatchDefinition),
}

/// Name and summary of every action key, used by the docs generator
pub const ACTION_CATALOGUE: &[(&str, &str)] = &[
    ("echo", "Log a message with variables resolved"),
    ("sleep", "Pause the test for the given milliseconds"),
    ("createVariables", "Create or overwrite test variables"),
    ("traceVariables", "Log all or selected test variables"),
    ("fail", "Fail the test with a message"),
    ("send", "Send a message to an endpoint"),
    ("receive", "Receive a message from an endpoint and validate it"),
    ("purge", "Discard pending messages of endpoints"),
    ("start", "Start server endpoints"),
    ("stop", "Stop server endpoints"),
    ("waitFor", "Wait for an HTTP URL, a file or a stored message"),
    ("http", "Send or receive HTTP requests and responses"),
    ("sql", "Execute SQL statements or scripts"),
    ("sqlQuery", "Query a data source and validate the result columns"),
    ("kubernetes", "Manage and verify Kubernetes resources"),
    ("selenium", "Drive a browser through WebDriver"),
    ("sequential", "Run nested actions in order"),
    ("iterate", "Run nested actions while a condition holds"),
    ("repeat", "Repeat nested actions until a condition becomes true"),
    ("repeatOnError", "Repeat failing nested actions until they pass"),
    ("conditional", "Run nested actions when an expression is true"),
    ("parallel", "Run nested actions concurrently"),
    ("assert", "Expect the nested action to fail"),
    ("catch", "Ignore errors of the nested actions"),
];

fn build_all(definitions: &[ActionDefinition]) -> Vec<ActionRef> {
    definitions.iter().map(ActionDefinition::build).collect()
}

impl ActionDefinition {
    /// Executable action for this definition
    pub fn build(&self) -> ActionRef {
        match self {
            ActionDefinition::Echo(action) => Arc::new(action.clone()),
            ActionDefinition::Sleep(action) => Arc::new(action.clone()),
            ActionDefinition::CreateVariables(action) => Arc::new(action.clone()),
            ActionDefinition::TraceVariables(action) => Arc::new(action.clone()),
            ActionDefinition::Fail(action) => Arc::new(action.clone()),
            ActionDefinition::Send(action) => Arc::new(action.clone()),
            ActionDefinition::Receive(action) => Arc::new(action.clone()),
            ActionDefinition::Purge(action) => Arc::new(action.clone()),
            ActionDefinition::Start(action) => Arc::new(action.clone()),
            ActionDefinition::Stop(action) => Arc::new(action.clone()),
            ActionDefinition::WaitFor(action) => Arc::new(action.clone()),
            ActionDefinition::Http(action) => Arc::new(action.clone()),
            ActionDefinition::Sql(action) => Arc::new(action.clone()),
            ActionDefinition::SqlQuery(action) => Arc::new(action.clone()),
            ActionDefinition::Kubernetes(action) => Arc::new(action.clone()),
            ActionDefinition::Selenium(action) => Arc::new(action.clone()),
            ActionDefinition::Sequential(definition) => Arc::new(SequentialAction {
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::Iterate(definition) => Arc::new(IterateAction {
                index: definition.index.clone(),
                start: definition.start,
                step: definition.step,
                condition: definition.condition.clone(),
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::Repeat(definition) => Arc::new(RepeatUntilTrueAction {
                index: definition.index.clone(),
                start: definition.start,
                until: definition.until.clone(),
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::RepeatOnError(definition) => Arc::new(RepeatOnErrorAction {
                index: definition.index.clone(),
                start: definition.start,
                until: definition.until.clone(),
                auto_sleep: definition.auto_sleep,
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::Conditional(definition) => Arc::new(ConditionalAction {
                when: definition.when.clone(),
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::Parallel(definition) => Arc::new(ParallelAction {
                actions: build_all(&definition.actions),
            }),
            ActionDefinition::Assert(definition) => Arc::new(AssertAction {
                error_type: definition.error_type.clone(),
                message: definition.message.clone(),
                action: definition.action.build(),
            }),
            ActionDefinition::Catch(definition) => Arc::new(CatchAction {
                error_type: definition.error_type.clone(),
                actions: build_all(&definition.actions),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;

    #[test]
    fn test_catalogue_covers_schema() {
        let schema = serde_json::to_value(schemars::schema_for!(ActionDefinition)).unwrap();
        let text = schema.to_string();
        for (name, _) in ACTION_CATALOGUE {
            assert!(text.contains(&format!("\"{}\"", name)), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_build_nested_containers() {
        let yaml = r#"
- createVariables:
    variables:
      - name: total
        value: "0"
- iterate:
    condition: i lt= 3
    actions:
      - createVariables:
          variables:
            - name: "last"
              value: "${i}"
- assert:
    type: failed
    message: "@contains('boom')@"
    action:
      fail:
        message: "boom ${last}"
- catch:
    actions:
      - receive:
          endpoint: direct:nothing
          timeout: 10
"#;
        let definitions: Vec<ActionDefinition> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definitions.len(), 4);

        let context = TestContext::new();
        for action in build_all(&definitions) {
            action.execute(&context).await.unwrap();
        }
        assert_eq!(context.get_variable("last").unwrap(), "3");
    }
}
