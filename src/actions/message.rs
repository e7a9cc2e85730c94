//! Send and receive actions with message building, validation and
//! variable extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::TestAction;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageSelector, MessageStore, MessageType};
use crate::validation::{
    json_path, JsonValidationContext, PlainTextValidationContext, ValidationContext, XmlValidationContext,
};

/// Message payload given inline or as file resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BodyDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Path of a file holding the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Builds messages to send and control messages to validate against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageBuilder {
    /// Name to store the message under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDefinition>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl MessageBuilder {
    pub fn with_body(mut self, data: impl Into<String>) -> Self {
        self.body = Some(BodyDefinition {
            data: Some(data.into()),
            resource: None,
        });
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn raw_payload(&self, context: &TestContext) -> CitrusResult<String> {
        match &self.body {
            Some(BodyDefinition { data: Some(data), .. }) => Ok(data.clone()),
            Some(BodyDefinition {
                resource: Some(resource),
                ..
            }) => {
                let path = context.replace_dynamic_content(resource)?;
                std::fs::read_to_string(&path)
                    .map_err(|e| CitrusError::runtime(format!("Failed to read message resource '{}': {}", path, e)))
            }
            _ => Ok(String::new()),
        }
    }

    /// Message to send, with all dynamic content resolved
    pub fn build(&self, context: &TestContext) -> CitrusResult<Message> {
        let payload = context.replace_dynamic_content(&self.raw_payload(context)?)?;
        let mut message = Message::new(payload);
        for (name, value) in context.resolve_map(&self.headers)? {
            message.set_header(name, value);
        }
        message.name = self.name.clone();
        Ok(message)
    }

    /// Control message; validators resolve dynamic content themselves so
    /// matcher expressions stay intact
    pub fn build_control(&self, context: &TestContext) -> CitrusResult<Message> {
        let mut message = Message::new(self.raw_payload(context)?);
        for (name, value) in &self.headers {
            message.set_header(name.clone(), value.clone());
        }
        message.name = self.name.clone();
        Ok(message)
    }
}

/// Sends a message to an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SendMessageAction {
    pub endpoint: String,
    #[serde(default)]
    pub message: MessageBuilder,
}

impl SendMessageAction {
    pub fn new(endpoint: impl Into<String>, message: MessageBuilder) -> Self {
        Self {
            endpoint: endpoint.into(),
            message,
        }
    }
}

#[async_trait]
impl TestAction for SendMessageAction {
    fn name(&self) -> &str {
        "send"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let endpoint = context.endpoints().get(&context.replace_dynamic_content(&self.endpoint)?)?;
        let message = self.message.build(context)?;

        let store_name = message
            .name
            .clone()
            .unwrap_or_else(|| MessageStore::store_name(endpoint.name(), "send"));
        context.messages().store(store_name, message.clone());

        info!("Sending message to endpoint: '{}'", endpoint.name());
        debug!("Message to send is:\n{}", message);
        endpoint.send(message, context).await
    }
}

/// Selector given as expression or as header map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum SelectorDefinition {
    Expression(String),
    Elements(BTreeMap<String, String>),
}

impl SelectorDefinition {
    fn build(&self, context: &TestContext) -> CitrusResult<MessageSelector> {
        match self {
            SelectorDefinition::Expression(expression) => {
                MessageSelector::parse(&context.replace_dynamic_content(expression)?)
            }
            SelectorDefinition::Elements(elements) => Ok(MessageSelector::from_map(context.resolve_map(elements)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct JsonPathExpression {
    pub expression: String,
    pub value: String,
}

/// Payload validation options of a receive action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ValidationDefinition {
    Json {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
        #[serde(default)]
        ignore: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    JsonPath(Vec<JsonPathExpression>),
    Xml {
        #[serde(default)]
        ignore: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        #[serde(default)]
        ignore_whitespace: bool,
        #[serde(default)]
        ignore_new_line: bool,
    },
}

impl ValidationDefinition {
    pub fn to_context(&self) -> ValidationContext {
        match self {
            ValidationDefinition::Json { strict, ignore, schema } => ValidationContext::Json(JsonValidationContext {
                strict: *strict,
                ignore_expressions: ignore.clone(),
                schema: schema.clone(),
            }),
            ValidationDefinition::JsonPath(expressions) => ValidationContext::JsonPath(
                expressions
                    .iter()
                    .map(|e| (e.expression.clone(), e.value.clone()))
                    .collect(),
            ),
            ValidationDefinition::Xml { ignore } => ValidationContext::Xml(XmlValidationContext {
                ignore_expressions: ignore.clone(),
            }),
            ValidationDefinition::Text {
                ignore_whitespace,
                ignore_new_line,
            } => ValidationContext::PlainText(PlainTextValidationContext {
                ignore_whitespace: *ignore_whitespace,
                ignore_new_line: *ignore_new_line,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HeaderExtract {
    pub name: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BodyExtract {
    /// JSONPath expression
    pub path: String,
    pub variable: String,
}

/// Values copied from a received message into variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExtractDefinition {
    #[serde(default)]
    pub header: Vec<HeaderExtract>,
    #[serde(default)]
    pub body: Vec<BodyExtract>,
}

impl ExtractDefinition {
    pub fn extract(&self, message: &Message, context: &TestContext) -> CitrusResult<()> {
        for extract in &self.header {
            let name = context.replace_dynamic_content(&extract.name)?;
            let value = message
                .header_value(&name)
                .or_else(|| message.header_ignore_case(&name).map(str::to_string))
                .ok_or_else(|| {
                    CitrusError::runtime(format!("Failed to extract header value: header element '{}' is missing", name))
                })?;
            info!("Setting variable: {} to value: {}", extract.variable, value);
            context.set_variable(&extract.variable, value)?;
        }

        for extract in &self.body {
            let path = context.replace_dynamic_content(&extract.path)?;
            let value = json_path::evaluate(&message.payload, &path)?;
            info!("Setting variable: {} to value: {}", extract.variable, value);
            context.set_variable(&extract.variable, value)?;
        }
        Ok(())
    }
}

/// Receives a message from an endpoint and validates it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessageAction {
    pub endpoint: String,
    #[serde(default)]
    pub message: MessageBuilder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorDefinition>,
    /// Receive timeout in milliseconds, defaults to the endpoint timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<ValidationDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractDefinition>,
}

impl ReceiveMessageAction {
    pub fn new(endpoint: impl Into<String>, message: MessageBuilder) -> Self {
        Self {
            endpoint: endpoint.into(),
            message,
            ..Default::default()
        }
    }

    fn message_type(&self, control: &Message, context: &TestContext) -> CitrusResult<MessageType> {
        if let Some(message_type) = self.message.message_type {
            return Ok(message_type);
        }
        if !control.payload.trim().is_empty() {
            return Ok(MessageType::detect(&control.payload));
        }
        context.settings().default_message_type.parse()
    }
}

#[async_trait]
impl TestAction for ReceiveMessageAction {
    fn name(&self) -> &str {
        "receive"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let endpoint = context.endpoints().get(&context.replace_dynamic_content(&self.endpoint)?)?;
        let timeout = self
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| endpoint.timeout());
        let selector = match &self.selector {
            Some(selector) => Some(selector.build(context)?),
            None => None,
        };

        match &selector {
            Some(selector) => info!("Receiving message from endpoint: '{}' with selector: {}", endpoint.name(), selector),
            None => info!("Receiving message from endpoint: '{}'", endpoint.name()),
        }
        let received = endpoint.receive(selector.as_ref(), timeout, context).await?;
        debug!("Received message:\n{}", received);

        let store_name = self
            .message
            .name
            .clone()
            .unwrap_or_else(|| MessageStore::store_name(endpoint.name(), "receive"));
        context.messages().store(store_name, received.clone());

        if let Some(extract) = &self.extract {
            extract.extract(&received, context)?;
        }

        let control = self.message.build_control(context)?;
        let message_type = self.message_type(&control, context)?;
        let mut contexts = vec![ValidationContext::Header];
        contexts.extend(self.validate.iter().map(ValidationDefinition::to_context));

        context
            .validators()
            .validate_message(&received, &control, message_type, context, &contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::Endpoint;

    async fn send(context: &TestContext, payload: &str) {
        SendMessageAction::new(
            "direct:orders",
            MessageBuilder::default()
                .with_body(payload)
                .with_header("operation", "${operation}"),
        )
        .execute(context)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_send_resolves_and_stores() {
        let context = TestContext::new();
        context.set_variable("operation", "create").unwrap();
        send(&context, r#"{"id": "citrus:concat('order-', 1)"}"#).await;

        let sent = context.messages().get("send:direct:orders").unwrap();
        assert_eq!(sent.payload, r#"{"id": "order-1"}"#);
        assert_eq!(sent.header("operation"), Some("create"));
    }

    #[tokio::test]
    async fn test_receive_validates_and_extracts() {
        let context = TestContext::new();
        context.set_variable("operation", "create").unwrap();
        send(&context, r#"{"id": "order-1", "items": 3}"#).await;

        let action: ReceiveMessageAction = serde_yaml::from_str(
            r#"
endpoint: direct:orders
timeout: 500
message:
  headers:
    operation: "@equalsIgnoreCase('CREATE')@"
  body:
    data: '{"id": "@startsWith(''order-'')@", "items": "@ignore@"}'
validate:
  - jsonPath:
      - expression: $.items
        value: "3"
extract:
  header:
    - name: operation
      variable: op
  body:
    - path: $.id
      variable: orderId
"#,
        )
        .unwrap();
        action.execute(&context).await.unwrap();

        assert_eq!(context.get_variable("op").unwrap(), "create");
        assert_eq!(context.get_variable("orderId").unwrap(), "order-1");
    }

    #[tokio::test]
    async fn test_receive_validation_failure() {
        let context = TestContext::new();
        context.set_variable("operation", "create").unwrap();
        send(&context, r#"{"id": "order-1"}"#).await;

        let action = ReceiveMessageAction::new(
            "direct:orders",
            MessageBuilder::default().with_body(r#"{"id": "order-2"}"#),
        );
        let err = action.execute(&context).await.unwrap_err();
        assert!(matches!(err, CitrusError::Validation(_)));
    }

    #[tokio::test]
    async fn test_receive_with_selector() {
        let context = TestContext::new();
        let endpoint = context.endpoints().get("direct:events").unwrap();
        endpoint
            .send(Message::new("one").with_header("kind", "a"), &context)
            .await
            .unwrap();
        endpoint
            .send(Message::new("two").with_header("kind", "b"), &context)
            .await
            .unwrap();

        let mut action = ReceiveMessageAction::new(
            "direct:events",
            MessageBuilder::default().with_body("two"),
        );
        action.selector = Some(SelectorDefinition::Expression("kind = 'b'".to_string()));
        action.timeout = Some(200);
        action.execute(&context).await.unwrap();
    }
}
