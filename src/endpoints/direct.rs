//! In-memory endpoint backed by a message queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Endpoint;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageQueue, MessageSelector};

fn default_direct_timeout() -> u64 {
    crate::settings::default_timeout()
}

/// Configuration of a direct endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectEndpointConfig {
    pub name: String,
    /// Name of the queue, defaults to the endpoint name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Receive timeout in milliseconds
    #[serde(default = "default_direct_timeout")]
    pub timeout: u64,
}

impl DirectEndpointConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: None,
            timeout: default_direct_timeout(),
        }
    }
}

/// Endpoint that sends to and receives from an in-memory queue
pub struct DirectEndpoint {
    config: DirectEndpointConfig,
    queue: MessageQueue,
}

impl DirectEndpoint {
    pub fn new(config: DirectEndpointConfig) -> Self {
        let queue_name = config.queue.clone().unwrap_or_else(|| config.name.clone());
        Self {
            queue: MessageQueue::new(queue_name),
            config,
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }
}

#[async_trait]
impl Endpoint for DirectEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "direct"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        debug!(endpoint = %self.config.name, queue = %self.queue.name(), "Sending message to queue");
        self.queue.push(message);
        Ok(())
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        self.queue
            .receive(selector, timeout)
            .await
            .ok_or_else(|| CitrusError::timeout(self.queue.name(), timeout))
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.queue.purge(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_receive_with_selector() {
        let context = TestContext::new();
        let endpoint = DirectEndpoint::new(DirectEndpointConfig::new("orders"));

        endpoint
            .send(Message::new("first").with_header("type", "a"), &context)
            .await
            .unwrap();
        endpoint
            .send(Message::new("second").with_header("type", "b"), &context)
            .await
            .unwrap();

        let selector = MessageSelector::new().with("type", "b");
        let message = endpoint
            .receive(Some(&selector), Duration::from_millis(100), &context)
            .await
            .unwrap();
        assert_eq!(message.payload, "second");
        assert_eq!(endpoint.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let context = TestContext::new();
        let endpoint = DirectEndpoint::new(DirectEndpointConfig::new("empty"));
        let err = endpoint
            .receive(None, Duration::from_millis(20), &context)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Action timeout after 20 milliseconds. Failed to receive message on endpoint: 'empty'"
        );
    }
}
