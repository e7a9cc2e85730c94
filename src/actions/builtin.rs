//! Basic actions: logging, variables, sleeping, failing and endpoint lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::TestAction;
use crate::common::{retry, RetryPolicy};
use crate::context::TestContext;
use crate::endpoints::http::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::error::{CitrusError, CitrusResult};
use crate::message::MessageSelector;

const DEFAULT_SLEEP_MS: u64 = 5000;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_WAIT_INTERVAL_MS: u64 = 1000;

/// Logs a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EchoAction {
    pub message: String,
}

#[async_trait]
impl TestAction for EchoAction {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let message = context.replace_dynamic_content(&self.message)?;
        info!("{}", message);
        Ok(())
    }
}

/// Pauses the test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SleepAction {
    #[serde(default = "default_sleep")]
    pub milliseconds: u64,
}

fn default_sleep() -> u64 {
    DEFAULT_SLEEP_MS
}

#[async_trait]
impl TestAction for SleepAction {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn execute(&self, _context: &TestContext) -> CitrusResult<()> {
        info!("Sleeping {} ms", self.milliseconds);
        tokio::time::sleep(Duration::from_millis(self.milliseconds)).await;
        info!("Returning after {} ms", self.milliseconds);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct VariableDefinition {
    pub name: String,
    pub value: String,
}

/// Creates test variables, values are resolved when the action runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CreateVariablesAction {
    pub variables: Vec<VariableDefinition>,
}

#[async_trait]
impl TestAction for CreateVariablesAction {
    fn name(&self) -> &str {
        "create-variables"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        for variable in &self.variables {
            let value = context.replace_dynamic_content(&variable.value)?;
            info!("Setting variable: {} to value: {}", variable.name, value);
            context.set_variable(&variable.name, value)?;
        }
        Ok(())
    }
}

/// Logs variable values, all variables when none are named
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TraceVariablesAction {
    #[serde(default)]
    pub variables: Vec<String>,
}

#[async_trait]
impl TestAction for TraceVariablesAction {
    fn name(&self) -> &str {
        "trace-variables"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        info!("Trace variables");
        if self.variables.is_empty() {
            for (name, value) in context.variables() {
                info!("Variable {} = {}", name, value);
            }
        } else {
            for name in &self.variables {
                info!("Variable {} = {}", name, context.get_variable(name)?);
            }
        }
        Ok(())
    }
}

/// Fails the test with a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FailAction {
    #[serde(default = "default_fail_message")]
    pub message: String,
}

fn default_fail_message() -> String {
    "Generated error to interrupt test execution".to_string()
}

#[async_trait]
impl TestAction for FailAction {
    fn name(&self) -> &str {
        "fail"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        Err(CitrusError::Fail(context.replace_dynamic_content(&self.message)?))
    }
}

/// Removes pending messages from endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PurgeEndpointAction {
    pub endpoints: Vec<String>,
    /// Only purge messages matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[async_trait]
impl TestAction for PurgeEndpointAction {
    fn name(&self) -> &str {
        "purge-endpoint"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let selector = match &self.selector {
            Some(expression) => Some(MessageSelector::parse(&context.replace_dynamic_content(expression)?)?),
            None => None,
        };

        for name in &self.endpoints {
            let endpoint = context.endpoints().get(&context.replace_dynamic_content(name)?)?;
            let purged = endpoint.purge(selector.as_ref()).await?;
            info!("Purged {} messages from endpoint: {}", purged, endpoint.name());
        }
        Ok(())
    }
}

/// Starts server endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StartServerAction {
    pub servers: Vec<String>,
}

#[async_trait]
impl TestAction for StartServerAction {
    fn name(&self) -> &str {
        "start-server"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        for name in &self.servers {
            let endpoint = context.endpoints().get(name)?;
            info!("Starting server: {}", endpoint.name());
            endpoint.start().await?;
        }
        Ok(())
    }
}

/// Stops server endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StopServerAction {
    pub servers: Vec<String>,
}

#[async_trait]
impl TestAction for StopServerAction {
    fn name(&self) -> &str {
        "stop-server"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        for name in &self.servers {
            let endpoint = context.endpoints().get(name)?;
            info!("Stopping server: {}", endpoint.name());
            endpoint.stop().await?;
        }
        Ok(())
    }
}

/// Condition a `waitFor` action polls for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum WaitCondition {
    /// URL answers with the expected status
    Http {
        url: String,
        #[serde(default = "default_wait_status")]
        status: u16,
        #[serde(default = "default_wait_method")]
        method: String,
    },
    /// File exists
    File { path: String },
    /// Message with this name is in the message store
    Message { name: String },
}

fn default_wait_status() -> u16 {
    200
}

fn default_wait_method() -> String {
    "HEAD".to_string()
}

/// Waits until a condition is satisfied or the timeout elapses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WaitForAction {
    #[serde(flatten)]
    pub condition: WaitCondition,
    #[serde(default = "default_wait_timeout")]
    pub timeout: u64,
    #[serde(default = "default_wait_interval")]
    pub interval: u64,
}

fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_wait_interval() -> u64 {
    DEFAULT_WAIT_INTERVAL_MS
}

impl WaitCondition {
    async fn check(&self, context: &TestContext, timeout: Duration) -> CitrusResult<()> {
        match self {
            WaitCondition::Http { url, status, method } => {
                let url = context.replace_dynamic_content(url)?;
                let method = http::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| CitrusError::config_invalid("method", format!("invalid HTTP method '{}'", method)))?;
                let response = ReqwestHttpClient::new()
                    .execute(HttpRequest::new(method, url.clone()).with_timeout(timeout))
                    .await
                    .map_err(|e| CitrusError::runtime(format!("Failed to connect to '{}': {}", url, e)))?;
                if response.status() == *status {
                    Ok(())
                } else {
                    Err(CitrusError::runtime(format!(
                        "URL '{}' answered with status {} instead of {}",
                        url,
                        response.status(),
                        status
                    )))
                }
            }
            WaitCondition::File { path } => {
                let path = context.replace_dynamic_content(path)?;
                if Path::new(&path).exists() {
                    Ok(())
                } else {
                    Err(CitrusError::runtime(format!("File '{}' does not exist", path)))
                }
            }
            WaitCondition::Message { name } => {
                let name = context.replace_dynamic_content(name)?;
                context
                    .messages()
                    .get(&name)
                    .map(|_| ())
                    .ok_or_else(|| CitrusError::runtime(format!("Message '{}' not found", name)))
            }
        }
    }
}

#[async_trait]
impl TestAction for WaitForAction {
    fn name(&self) -> &str {
        "wait-for"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let timeout = Duration::from_millis(self.timeout);
        let interval = Duration::from_millis(self.interval);
        let policy = RetryPolicy::for_timeout(timeout, interval);
        debug!(?timeout, ?interval, "Waiting for condition");

        retry(policy, "Wait condition", |_| self.condition.check(context, interval))
            .await
            .map_err(|e| {
                CitrusError::runtime(format!(
                    "Failed to wait for condition to be satisfied after {} ms: {}",
                    self.timeout, e
                ))
            })?;
        info!("Wait condition satisfied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_create_variables_resolves_values() {
        let context = TestContext::new();
        context.set_variable("user", "citrus").unwrap();
        CreateVariablesAction {
            variables: vec![VariableDefinition {
                name: "greeting".to_string(),
                value: "citrus:concat('Hello ', ${user})".to_string(),
            }],
        }
        .execute(&context)
        .await
        .unwrap();
        assert_eq!(context.get_variable("greeting").unwrap(), "Hello citrus");
    }

    #[tokio::test]
    async fn test_fail_action() {
        let context = TestContext::new();
        context.set_variable("reason", "broken").unwrap();
        let err = FailAction {
            message: "Test is ${reason}".to_string(),
        }
        .execute(&context)
        .await
        .unwrap_err();
        assert_eq!(err, CitrusError::Fail("Test is broken".to_string()));
    }

    #[tokio::test]
    async fn test_purge_endpoint() {
        let context = TestContext::new();
        let endpoint = context.endpoints().get("direct:inbox").unwrap();
        endpoint.send(Message::new("a"), &context).await.unwrap();
        endpoint.send(Message::new("b"), &context).await.unwrap();

        PurgeEndpointAction {
            endpoints: vec!["direct:inbox".to_string()],
            selector: None,
        }
        .execute(&context)
        .await
        .unwrap();
        assert!(endpoint
            .receive(None, Duration::from_millis(10), &context)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_wait_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ready.txt");
        let context = TestContext::new();
        let action = WaitForAction {
            condition: WaitCondition::File {
                path: path.display().to_string(),
            },
            timeout: 100,
            interval: 20,
        };
        assert!(action.execute(&context).await.is_err());

        std::fs::write(&path, "ok").unwrap();
        assert!(action.execute(&context).await.is_ok());
    }

    #[test]
    fn test_wait_for_from_yaml() {
        let action: WaitForAction =
            serde_yaml::from_str("http:\n  url: http://localhost:8080/health\ntimeout: 2000").unwrap();
        assert_eq!(action.timeout, 2000);
        assert_eq!(action.interval, 1000);
        assert!(matches!(action.condition, WaitCondition::Http { status: 200, .. }));
    }
}
