//! Structural JSON payload validation.

use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::HashSet;
use tracing::debug;

use super::matcher::is_matcher_expression;
use super::{JsonValidationContext, MessageValidator, ValidationContext};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageType};
use crate::settings::IGNORE_PLACEHOLDER;

/// Compares received and control JSON documents entry by entry.
///
/// Control values may use `@ignore@` and validation matcher expressions.
/// Received entries addressed by ignore expressions (JSONPath) are skipped.
/// In strict mode objects and arrays must have the same number of entries,
/// otherwise received documents may carry additional entries and control
/// array items may match received items in any order.
pub struct JsonTextMessageValidator;

impl MessageValidator for JsonTextMessageValidator {
    fn name(&self) -> &str {
        "json"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Json
    }

    fn validate(
        &self,
        received: &Message,
        control: &Message,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        let options = contexts
            .iter()
            .find_map(|ctx| match ctx {
                ValidationContext::Json(options) => Some(options.clone()),
                _ => None,
            })
            .unwrap_or_default();

        if let Some(schema) = &options.schema {
            validate_schema(&received.payload, schema, context)?;
        }

        if control.payload.trim().is_empty() {
            debug!("Skip JSON payload validation as no control payload was provided");
            return Ok(());
        }

        if received.payload.trim().is_empty() {
            return Err(CitrusError::validation(
                "expected message contents, but received empty message!",
            ));
        }

        let received_json: Value = serde_json::from_str(&received.payload).map_err(|e| {
            CitrusError::validation(format!("Failed to parse received JSON payload: {}", e))
        })?;
        let control_payload = context.replace_dynamic_content(&control.payload)?;
        let control_json: Value = serde_json::from_str(&control_payload).map_err(|e| {
            CitrusError::validation(format!("Failed to parse control JSON payload: {}", e))
        })?;

        JsonComparison::new(&options, &received_json, context)?.compare(&received_json, &control_json, context)?;
        debug!("JSON payload validation successful: All values OK");
        Ok(())
    }
}

/// Validate a payload against a JSON schema given inline or as a file path
pub fn validate_schema(payload: &str, schema: &str, context: &TestContext) -> CitrusResult<()> {
    let schema_source = if schema.trim_start().starts_with('{') {
        schema.to_string()
    } else {
        std::fs::read_to_string(schema).map_err(|e| {
            CitrusError::Io(format!("Failed to read JSON schema '{}': {}", schema, e))
        })?
    };
    let schema_source = context.replace_dynamic_content(&schema_source)?;

    let schema_value: Value = serde_json::from_str(&schema_source)
        .map_err(|e| CitrusError::parse("JSON schema", e))?;
    let validator = jsonschema::Validator::new(&schema_value)
        .map_err(|e| CitrusError::parse("JSON schema", e))?;

    let data: Value = serde_json::from_str(payload).map_err(|e| {
        CitrusError::validation(format!("Failed to parse received JSON payload: {}", e))
    })?;

    let errors: Vec<String> = validator.iter_errors(&data).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(CitrusError::validation(format!(
            "JSON schema validation failed: {}",
            errors.join("; ")
        )));
    }

    debug!("JSON schema validation successful");
    Ok(())
}

struct JsonComparison {
    strict: bool,
    ignored: HashSet<String>,
}

impl JsonComparison {
    fn new(options: &JsonValidationContext, received: &Value, context: &TestContext) -> CitrusResult<Self> {
        let mut ignored = HashSet::new();
        for expression in &options.ignore_expressions {
            let expression = context.replace_dynamic_content(expression)?;
            let path = JsonPath::parse(&expression).map_err(|e| {
                CitrusError::parse("JSONPath", format!("'{}': {}", expression, e))
            })?;
            for location in path.query_located(received).locations() {
                ignored.insert(location.to_json_pointer());
            }
        }

        Ok(Self {
            strict: options.strict.unwrap_or(context.settings().json_strict),
            ignored,
        })
    }

    fn compare(&self, received: &Value, control: &Value, context: &TestContext) -> CitrusResult<()> {
        let root = Entry {
            field: "$",
            path: "$".to_string(),
            pointer: String::new(),
        };
        self.compare_value(&root, received, control, context)
    }

    /// Compare one entry; `entry.field` is the object key handed to matchers,
    /// `entry.path` is used in error messages
    fn compare_value(
        &self,
        entry: &Entry<'_>,
        received: &Value,
        control: &Value,
        context: &TestContext,
    ) -> CitrusResult<()> {
        let path = entry.path.as_str();
        if self.ignored.contains(&entry.pointer) {
            debug!(entry = path, "Ignoring JSON entry");
            return Ok(());
        }

        match control {
            Value::String(text) if text.trim() == IGNORE_PLACEHOLDER => {
                debug!(entry = path, "Ignoring JSON entry");
                Ok(())
            }
            Value::String(text) if is_matcher_expression(text) => {
                context.matchers().validate(entry.field, &as_text(received), text, context)
            }
            Value::Object(control_map) => {
                let received_map = received.as_object().ok_or_else(|| type_mismatch(path, control, received))?;

                if self.strict && control_map.len() != received_map.len() {
                    return Err(CitrusError::validation(format!(
                        "Number of JSON entries not equal for element: '{}', expected '{}' but was '{}'",
                        path,
                        control_map.len(),
                        received_map.len()
                    )));
                }

                for (key, control_value) in control_map {
                    let received_value = received_map.get(key).ok_or_else(|| {
                        CitrusError::validation(format!(
                            "Missing JSON entry, expected '{}' to be in '{}'",
                            key, received
                        ))
                    })?;
                    let child = Entry {
                        field: key,
                        path: format!("{}.{}", path, key),
                        pointer: format!("{}/{}", entry.pointer, escape_pointer(key)),
                    };
                    self.compare_value(&child, received_value, control_value, context)?;
                }
                Ok(())
            }
            Value::Array(control_items) => {
                let received_items = received.as_array().ok_or_else(|| type_mismatch(path, control, received))?;

                if self.strict && control_items.len() != received_items.len() {
                    return Err(CitrusError::validation(format!(
                        "Number of JSON entries not equal for element: '{}', expected '{}' but was '{}'",
                        path,
                        control_items.len(),
                        received_items.len()
                    )));
                }

                if self.strict {
                    for (index, (received_item, control_item)) in
                        received_items.iter().zip(control_items).enumerate()
                    {
                        self.compare_value(&entry.item(index, index), received_item, control_item, context)?;
                    }
                    return Ok(());
                }

                // Candidates are tried on a scratch context so matchers like
                // `@variable()@` only take effect for the chosen item
                let scratch = context.scratch();
                let mut consumed = vec![false; received_items.len()];
                for (index, control_item) in control_items.iter().enumerate() {
                    let chosen = received_items.iter().enumerate().position(|(received_index, item)| {
                        !consumed[received_index]
                            && self
                                .compare_value(&entry.item(index, received_index), item, control_item, &scratch)
                                .is_ok()
                    });
                    let Some(received_index) = chosen else {
                        return Err(CitrusError::validation(format!(
                            "An item in '{}' is missing, expected '{}' to be in '{}'",
                            path, control_item, received
                        )));
                    };
                    consumed[received_index] = true;
                    self.compare_value(
                        &entry.item(index, received_index),
                        &received_items[received_index],
                        control_item,
                        context,
                    )?;
                }
                Ok(())
            }
            Value::Null => {
                if received.is_null() {
                    Ok(())
                } else {
                    Err(CitrusError::validation(format!(
                        "Values not equal for entry: '{}', expected 'null' but was '{}'",
                        path, received
                    )))
                }
            }
            Value::Number(control_number) => match received {
                Value::Number(received_number) if received_number.as_f64() == control_number.as_f64() => Ok(()),
                Value::Object(_) | Value::Array(_) => Err(type_mismatch(path, control, received)),
                _ => Err(not_equal(path, control, received)),
            },
            Value::Bool(_) | Value::String(_) => {
                if received.is_object() || received.is_array() {
                    return Err(type_mismatch(path, control, received));
                }
                if as_text(received) == as_text(control) {
                    Ok(())
                } else {
                    Err(not_equal(path, control, received))
                }
            }
        }
    }
}

/// Position of a value inside the compared documents
struct Entry<'a> {
    field: &'a str,
    path: String,
    pointer: String,
}

impl<'a> Entry<'a> {
    /// Array item at `index` in the control and `received_index` in the
    /// received document; items keep the field name of their array
    fn item(&self, index: usize, received_index: usize) -> Entry<'a> {
        Entry {
            field: self.field,
            path: format!("{}[{}]", self.path, index),
            pointer: format!("{}/{}", self.pointer, received_index),
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(path: &str, control: &Value, received: &Value) -> CitrusError {
    CitrusError::validation(format!(
        "Type mismatch for JSON entry '{}', expected '{}' but was '{}'",
        path,
        type_name(control),
        type_name(received)
    ))
}

fn not_equal(path: &str, control: &Value, received: &Value) -> CitrusError {
    CitrusError::validation(format!(
        "Values not equal for entry: '{}', expected '{}' but was '{}'",
        path,
        as_text(control),
        as_text(received)
    ))
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(received: &str, control: &str, options: JsonValidationContext) -> CitrusResult<()> {
        let context = TestContext::new();
        JsonTextMessageValidator.validate(
            &Message::new(received),
            &Message::new(control),
            &context,
            &[ValidationContext::Json(options)],
        )
    }

    #[test]
    fn test_equal_documents() {
        let payload = r#"{"id": 1, "name": "citrus", "tags": ["a", "b"], "owner": null, "nested": {"ok": true}}"#;
        assert!(validate(payload, payload, JsonValidationContext::default()).is_ok());
    }

    #[test]
    fn test_value_mismatch() {
        let err = validate(r#"{"name": "foo"}"#, r#"{"name": "bar"}"#, JsonValidationContext::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: Values not equal for entry: '$.name', expected 'bar' but was 'foo'"
        );
    }

    #[test]
    fn test_strict_mode_entry_count() {
        let received = r#"{"name": "foo", "extra": 1}"#;
        let control = r#"{"name": "foo"}"#;
        let err = validate(received, control, JsonValidationContext::default()).unwrap_err();
        assert!(err.to_string().contains("Number of JSON entries not equal for element: '$'"));

        let lenient = JsonValidationContext {
            strict: Some(false),
            ..Default::default()
        };
        assert!(validate(received, control, lenient).is_ok());
    }

    #[test]
    fn test_missing_entry_and_type_mismatch() {
        let err = validate(r#"{"a": 1}"#, r#"{"b": 1}"#, JsonValidationContext::default()).unwrap_err();
        assert!(err.to_string().contains("Missing JSON entry, expected 'b'"));

        let err = validate(r#"{"a": [1]}"#, r#"{"a": {"b": 1}}"#, JsonValidationContext::default()).unwrap_err();
        assert!(err.to_string().contains("Type mismatch for JSON entry '$.a'"));
    }

    #[test]
    fn test_ignore_placeholder_and_expressions() {
        let received = r#"{"id": "x-123", "timestamp": 1700000000, "items": [{"sku": "a", "price": 3}]}"#;
        let control = r#"{"id": "@ignore@", "timestamp": 0, "items": [{"sku": "a", "price": 4}]}"#;

        let options = JsonValidationContext {
            ignore_expressions: vec!["$.timestamp".to_string(), "$.items[*].price".to_string()],
            ..Default::default()
        };
        assert!(validate(received, control, options).is_ok());
    }

    #[test]
    fn test_matchers_and_null() {
        let received = r#"{"id": 42, "name": "citrus", "owner": null}"#;
        let control = r#"{"id": "@greaterThan(40)@", "name": "@startsWith('cit')@", "owner": null}"#;
        assert!(validate(received, control, JsonValidationContext::default()).is_ok());

        let err = validate(r#"{"owner": "me"}"#, r#"{"owner": null}"#, JsonValidationContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("expected 'null' but was '\"me\"'"));
    }

    #[test]
    fn test_empty_payloads() {
        assert!(validate(r#"{"a": 1}"#, "", JsonValidationContext::default()).is_ok());
        let err = validate("", r#"{"a": 1}"#, JsonValidationContext::default()).unwrap_err();
        assert!(err.to_string().contains("expected message contents, but received empty message!"));
    }

    #[test]
    fn test_non_strict_arrays_ignore_order() {
        let lenient = JsonValidationContext {
            strict: Some(false),
            ..Default::default()
        };
        assert!(validate(r#"[3, 1, 2]"#, r#"[1, 2]"#, lenient.clone()).is_ok());
        assert!(validate(r#"[3, 1]"#, r#"[4]"#, lenient).is_err());
    }

    #[test]
    fn test_variable_matcher_uses_entry_name() {
        let context = TestContext::new();
        JsonTextMessageValidator
            .validate(
                &Message::new(r#"{"orderId": "1001", "customer": {"id": 7}}"#),
                &Message::new(r#"{"orderId": "@variable()@", "customer": {"id": "@variable('customerId')@"}}"#),
                &context,
                &[],
            )
            .unwrap();
        assert_eq!(context.get_variable("orderId").unwrap(), "1001");
        assert_eq!(context.get_variable("customerId").unwrap(), "7");
        assert!(!context.has_variable("$.orderId"));
    }

    #[test]
    fn test_control_is_resolved_once() {
        let context = TestContext::new();
        context.set_variable("template", "${name}").unwrap();
        let received = Message::new(r#"{"escaped": "${name}", "value": "${name}"}"#);
        let control = Message::new(r#"{"escaped": "${//name//}", "value": "${template}"}"#);
        assert!(JsonTextMessageValidator.validate(&received, &control, &context, &[]).is_ok());
    }

    #[test]
    fn test_non_strict_arrays_consume_items_once() {
        let lenient = JsonValidationContext {
            strict: Some(false),
            ..Default::default()
        };
        assert!(validate(r#"[1, 2]"#, r#"[1, 1]"#, lenient.clone()).is_err());
        assert!(validate(r#"[1, 1, 2]"#, r#"[1, 1]"#, lenient.clone()).is_ok());

        let context = TestContext::new();
        JsonTextMessageValidator
            .validate(
                &Message::new(r#"[{"type": "a", "id": "1"}, {"type": "b", "id": "2"}]"#),
                &Message::new(r#"[{"type": "b", "id": "@variable()@"}]"#),
                &context,
                &[ValidationContext::Json(lenient)],
            )
            .unwrap();
        assert_eq!(context.get_variable("id").unwrap(), "2");
    }

    #[test]
    fn test_schema_validation() {
        let schema = r#"{"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}}"#;
        let options = JsonValidationContext {
            schema: Some(schema.to_string()),
            ..Default::default()
        };
        assert!(validate(r#"{"id": 1}"#, "", options.clone()).is_ok());
        let err = validate(r#"{"id": "x"}"#, "", options).unwrap_err();
        assert!(err.to_string().contains("JSON schema validation failed"));
    }
}
