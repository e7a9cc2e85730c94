//! Message validation: validation contexts, the validator registry and the
//! header validator. Payload validators live in the sub modules.

pub mod json;
pub mod json_path;
pub mod matcher;
pub mod text;
pub mod xml;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message, MessageType};

pub use json::JsonTextMessageValidator;
pub use json_path::JsonPathMessageValidator;
pub use text::PlainTextMessageValidator;
pub use xml::XmlMessageValidator;

/// Options for JSON payload validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonValidationContext {
    /// Overrides the strict setting from the framework settings
    pub strict: Option<bool>,
    /// JSONPath expressions of received entries to skip
    pub ignore_expressions: Vec<String>,
    /// JSON schema (inline JSON or file path) the received payload must satisfy
    pub schema: Option<String>,
}

/// Options for XML payload validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlValidationContext {
    /// Element paths (`/root/a`, `//a`, `/root/a/@attr`) to skip
    pub ignore_expressions: Vec<String>,
}

/// Options for plain text validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainTextValidationContext {
    pub ignore_whitespace: bool,
    pub ignore_new_line: bool,
}

/// Validation configuration for a received message
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationContext {
    Header,
    Json(JsonValidationContext),
    /// JSONPath expression to expected value
    JsonPath(BTreeMap<String, String>),
    Xml(XmlValidationContext),
    PlainText(PlainTextValidationContext),
}

/// Validator for one aspect of a received message
pub trait MessageValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the validator applies to messages of the given type
    fn supports(&self, message_type: MessageType) -> bool;

    fn validate(
        &self,
        received: &Message,
        control: &Message,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()>;
}

/// Validators applied to received messages
pub struct MessageValidatorRegistry {
    validators: RwLock<Vec<Arc<dyn MessageValidator>>>,
}

impl Default for MessageValidatorRegistry {
    fn default() -> Self {
        Self {
            validators: RwLock::new(Vec::new()),
        }
    }
}

impl MessageValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the header, JSON, JSONPath, XML and plain text validators
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(HeaderValidator));
        registry.register(Arc::new(JsonTextMessageValidator));
        registry.register(Arc::new(JsonPathMessageValidator));
        registry.register(Arc::new(XmlMessageValidator));
        registry.register(Arc::new(PlainTextMessageValidator));
        registry
    }

    pub fn register(&self, validator: Arc<dyn MessageValidator>) {
        if let Ok(mut validators) = self.validators.write() {
            validators.push(validator);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|v| v.name().to_string()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn MessageValidator>> {
        self.validators
            .read()
            .map(|validators| validators.clone())
            .unwrap_or_default()
    }

    /// Run every validator supporting the message type
    pub fn validate_message(
        &self,
        received: &Message,
        control: &Message,
        message_type: MessageType,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        debug!(message_id = %received.id, %message_type, "Validating received message");
        let validators: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|validator| validator.supports(message_type))
            .collect();

        if validators.is_empty() {
            return Err(CitrusError::runtime(format!(
                "Unable to find proper message validator for message type '{}'",
                message_type
            )));
        }

        for validator in validators {
            debug!(validator = validator.name(), "Running message validator");
            validator.validate(received, control, context, contexts)?;
        }

        info!("Message validation successful: All values OK");
        Ok(())
    }
}

/// Validates control headers against received headers
pub struct HeaderValidator;

impl MessageValidator for HeaderValidator {
    fn name(&self) -> &str {
        "header"
    }

    fn supports(&self, _message_type: MessageType) -> bool {
        true
    }

    fn validate(
        &self,
        received: &Message,
        control: &Message,
        context: &TestContext,
        _contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        for (name, expected) in &control.headers {
            if name == headers::MESSAGE_ID || name == headers::MESSAGE_TIMESTAMP {
                continue;
            }

            let name = context.replace_dynamic_content(name)?;
            let actual = received
                .header_value(&name)
                .or_else(|| received.header_ignore_case(&name).map(str::to_string))
                .ok_or_else(|| {
                    CitrusError::validation(format!("Header element '{}' is missing", name))
                })?;

            matcher::validate_value(&name, &actual, expected, context)?;
            debug!(header = %name, value = %actual, "Validating header element: OK");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_validation() {
        let context = TestContext::new();
        let received = Message::new("")
            .with_header("Operation", "sayHello")
            .with_header("requestId", "42");

        let control = Message::new("").with_header("operation", "sayHello");
        assert!(HeaderValidator.validate(&received, &control, &context, &[]).is_ok());

        let control = Message::new("").with_header("requestId", "@isNumber()@");
        assert!(HeaderValidator.validate(&received, &control, &context, &[]).is_ok());

        let control = Message::new("").with_header("missing", "x");
        let err = HeaderValidator.validate(&received, &control, &context, &[]).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Header element 'missing' is missing");
    }

    #[test]
    fn test_registry_selects_by_message_type() {
        let context = TestContext::new();
        let registry = MessageValidatorRegistry::with_defaults();

        let received = Message::new(r#"{"greeting": "Hello"}"#);
        let control = Message::new(r#"{"greeting": "@startsWith('He')@"}"#);
        registry
            .validate_message(&received, &control, MessageType::Json, &context, &[])
            .unwrap();

        let control = Message::new(r#"{"greeting": "Bye"}"#);
        assert!(registry
            .validate_message(&received, &control, MessageType::Json, &context, &[])
            .is_err());
        assert_eq!(registry.names().len(), 5);
    }
}
