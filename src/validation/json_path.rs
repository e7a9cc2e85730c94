//! JSONPath expression evaluation for validation and variable extraction.

use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use super::matcher;
use super::{MessageValidator, ValidationContext};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageType};

/// Evaluate a JSONPath expression on a JSON payload and return the result as text.
///
/// Expressions may end with one of the functions `.size()`, `.keySet()`,
/// `.values()` or `.toString()`.
pub fn evaluate(payload: &str, expression: &str) -> CitrusResult<String> {
    let json: Value = serde_json::from_str(payload).map_err(|e| {
        CitrusError::validation(format!("Failed to parse JSON payload: {}", e))
    })?;
    let value = evaluate_value(&json, expression)?;
    Ok(to_text(&value))
}

/// Evaluate a JSONPath expression on a parsed document
pub fn evaluate_value(json: &Value, expression: &str) -> CitrusResult<Value> {
    let (path_expression, function) = split_function(expression.trim());
    let path = JsonPath::parse(path_expression).map_err(|e| {
        CitrusError::parse("JSONPath", format!("'{}': {}", path_expression, e))
    })?;

    let nodes = path.query(json).all();
    let value = match nodes.len() {
        0 => {
            return Err(CitrusError::validation(format!(
                "Failed to evaluate JSON path expression: {}",
                expression
            )))
        }
        1 => nodes[0].clone(),
        _ => Value::Array(nodes.into_iter().cloned().collect()),
    };

    Ok(match function {
        None => value,
        Some("size") => Value::from(match &value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 1,
        }),
        Some("keySet") => match &value {
            Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
            _ => Value::Array(Vec::new()),
        },
        Some("values") => match &value {
            Value::Object(map) => Value::Array(map.values().cloned().collect()),
            other => other.clone(),
        },
        Some(_) => Value::String(value.to_string()),
    })
}

const FUNCTIONS: [&str; 4] = ["size", "keySet", "values", "toString"];

fn split_function(expression: &str) -> (&str, Option<&'static str>) {
    for function in FUNCTIONS {
        let suffix = format!(".{}()", function);
        if let Some(path) = expression.strip_suffix(suffix.as_str()) {
            return (path, Some(function));
        }
    }
    (expression, None)
}

/// Text representation of a JSON value as used in validation
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) if items.iter().all(|item| !item.is_object() && !item.is_array()) => {
            format!(
                "[{}]",
                items.iter().map(to_text).collect::<Vec<_>>().join(", ")
            )
        }
        other => other.to_string(),
    }
}

/// Validates JSONPath expressions against expected values
pub struct JsonPathMessageValidator;

impl MessageValidator for JsonPathMessageValidator {
    fn name(&self) -> &str {
        "json-path"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Json
    }

    fn validate(
        &self,
        received: &Message,
        _control: &Message,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        for ctx in contexts {
            let ValidationContext::JsonPath(expressions) = ctx else {
                continue;
            };

            if received.is_empty() {
                return Err(CitrusError::validation(
                    "Unable to validate JSONPath expressions on empty message payload",
                ));
            }

            let json: Value = serde_json::from_str(&received.payload).map_err(|e| {
                CitrusError::validation(format!("Failed to parse received JSON payload: {}", e))
            })?;

            for (expression, expected) in expressions {
                let expression = context.replace_dynamic_content(expression)?;
                let actual = to_text(&evaluate_value(&json, &expression)?);
                matcher::validate_value(&expression, &actual, expected, context)?;
                debug!(expression = %expression, value = %actual, "Validating element: OK");
            }
        }
        Ok(())
    }
}
