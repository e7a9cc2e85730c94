//! DOM based XML payload validation.

use roxmltree::{Document, Node};
use tracing::debug;

use super::matcher::is_matcher_expression;
use super::{MessageValidator, ValidationContext, XmlValidationContext};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageType};
use crate::settings::IGNORE_PLACEHOLDER;

/// Compares received and control XML documents element by element.
///
/// Element names, namespaces, attributes, child element order and text
/// content are validated. `@ignore@` may replace text, attribute values or
/// whole elements; ignore expressions address elements and attributes by
/// path (`/order/id`, `//id`, `/order/@version`).
pub struct XmlMessageValidator;

impl MessageValidator for XmlMessageValidator {
    fn name(&self) -> &str {
        "xml"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Xml
    }

    fn validate(
        &self,
        received: &Message,
        control: &Message,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        if control.payload.trim().is_empty() {
            debug!("Skip XML payload validation as no control payload was provided");
            return Ok(());
        }

        if received.payload.trim().is_empty() {
            return Err(CitrusError::validation(
                "expected message contents, but received empty message!",
            ));
        }

        let options = contexts
            .iter()
            .find_map(|ctx| match ctx {
                ValidationContext::Xml(options) => Some(options.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let control_payload = context.replace_dynamic_content(&control.payload)?;
        let received_doc = Document::parse(&received.payload).map_err(|e| {
            CitrusError::validation(format!("Failed to parse received XML payload: {}", e))
        })?;
        let control_doc = Document::parse(&control_payload).map_err(|e| {
            CitrusError::validation(format!("Failed to parse control XML payload: {}", e))
        })?;

        let ignore = IgnoreExpressions::parse(&options, context)?;
        XmlComparison { ignore, context }.compare_element(
            received_doc.root_element(),
            control_doc.root_element(),
            &[],
        )?;

        debug!("XML payload validation successful: All values OK");
        Ok(())
    }
}

#[derive(Debug)]
struct IgnoreExpression {
    descendant: bool,
    segments: Vec<String>,
    attribute: Option<String>,
}

#[derive(Debug, Default)]
struct IgnoreExpressions(Vec<IgnoreExpression>);

impl IgnoreExpressions {
    fn parse(options: &XmlValidationContext, context: &TestContext) -> CitrusResult<Self> {
        let mut expressions = Vec::new();
        for raw in &options.ignore_expressions {
            let raw = context.replace_dynamic_content(raw)?;
            let (descendant, rest) = match raw.strip_prefix("//") {
                Some(rest) => (true, rest),
                None => match raw.strip_prefix('/') {
                    Some(rest) => (false, rest),
                    None => {
                        return Err(CitrusError::config_invalid(
                            "ignore",
                            format!("unsupported XML ignore expression '{}'", raw),
                        ))
                    }
                },
            };

            let mut segments: Vec<String> = rest
                .split('/')
                .map(|segment| local_name(segment).to_string())
                .collect();
            let attribute = match segments.last() {
                Some(last) if last.starts_with('@') => segments.pop().map(|a| a[1..].to_string()),
                _ => None,
            };

            expressions.push(IgnoreExpression {
                descendant,
                segments,
                attribute,
            });
        }
        Ok(Self(expressions))
    }

    fn matches(&self, path: &[&str], attribute: Option<&str>) -> bool {
        self.0.iter().any(|expression| {
            if expression.attribute.as_deref() != attribute {
                return false;
            }
            if expression.descendant {
                path.ends_with(
                    &expression
                        .segments
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>(),
                )
            } else {
                path.iter().copied().eq(expression.segments.iter().map(String::as_str))
            }
        })
    }
}

fn local_name(qualified: &str) -> &str {
    match qualified.split_once(':') {
        Some((_, local)) => local,
        None => qualified,
    }
}

struct XmlComparison<'a> {
    ignore: IgnoreExpressions,
    context: &'a TestContext,
}

impl XmlComparison<'_> {
    fn compare_element(&self, received: Node, control: Node, parent: &[&str]) -> CitrusResult<()> {
        let mut path: Vec<&str> = parent.to_vec();
        path.push(control.tag_name().name());
        let display_path = format!("/{}", path.join("/"));

        if self.ignore.matches(&path, None) {
            debug!(element = %display_path, "Ignoring element");
            return Ok(());
        }

        if received.tag_name().name() != control.tag_name().name() {
            return Err(CitrusError::validation(format!(
                "Element names not equal, expected '{}' but was '{}'",
                control.tag_name().name(),
                received.tag_name().name()
            )));
        }

        if received.tag_name().namespace() != control.tag_name().namespace() {
            return Err(CitrusError::validation(format!(
                "Element '{}' namespace not equal, expected '{}' but was '{}'",
                display_path,
                control.tag_name().namespace().unwrap_or_default(),
                received.tag_name().namespace().unwrap_or_default()
            )));
        }

        let control_text = text_content(control);
        if control_text == IGNORE_PLACEHOLDER {
            debug!(element = %display_path, "Ignoring element");
            return Ok(());
        }

        self.compare_attributes(received, control, &path, &display_path)?;

        let control_children: Vec<Node> = control.children().filter(Node::is_element).collect();
        let received_children: Vec<Node> = received.children().filter(Node::is_element).collect();

        if control_children.len() != received_children.len() {
            return Err(CitrusError::validation(format!(
                "Number of child elements not equal for element '{}', expected '{}' but was '{}'",
                display_path,
                control_children.len(),
                received_children.len()
            )));
        }

        if control_children.is_empty() {
            self.compare_value(control.tag_name().name(), &display_path, &text_content(received), &control_text)?;
            debug!(element = %display_path, "Validating element: OK");
            return Ok(());
        }

        for (received_child, control_child) in received_children.into_iter().zip(control_children) {
            self.compare_element(received_child, control_child, &path)?;
        }
        Ok(())
    }

    fn compare_attributes(
        &self,
        received: Node,
        control: Node,
        path: &[&str],
        display_path: &str,
    ) -> CitrusResult<()> {
        let received_count = received
            .attributes()
            .filter(|attribute| !self.ignore.matches(path, Some(attribute.name())))
            .count();
        let control_count = control
            .attributes()
            .filter(|attribute| !self.ignore.matches(path, Some(attribute.name())))
            .count();

        if received_count != control_count {
            return Err(CitrusError::validation(format!(
                "Number of attributes not equal for element '{}', expected '{}' but was '{}'",
                display_path, control_count, received_count
            )));
        }

        for attribute in control.attributes() {
            if self.ignore.matches(path, Some(attribute.name())) {
                continue;
            }

            let actual = received
                .attributes()
                .find(|candidate| {
                    candidate.name() == attribute.name() && candidate.namespace() == attribute.namespace()
                })
                .ok_or_else(|| {
                    CitrusError::validation(format!(
                        "Attribute validation failed for element '{}', missing attribute '{}'",
                        display_path,
                        attribute.name()
                    ))
                })?;

            let attribute_path = format!("{}/@{}", display_path, attribute.name());
            self.compare_value(attribute.name(), &attribute_path, actual.value(), attribute.value())?;
        }
        Ok(())
    }

    /// Compare resolved control text; matchers see the element or attribute
    /// name as field
    fn compare_value(&self, field: &str, path: &str, received: &str, control: &str) -> CitrusResult<()> {
        if control.trim() == IGNORE_PLACEHOLDER {
            debug!(entry = %path, "Ignoring value");
            return Ok(());
        }
        if is_matcher_expression(control) {
            return self.context.matchers().validate(field, received, control, self.context);
        }
        if received != control {
            return Err(CitrusError::validation(format!(
                "Values not equal for '{}', expected '{}' but was '{}'",
                path, control, received
            )));
        }
        Ok(())
    }
}

fn text_content(node: Node) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(received: &str, control: &str, ignore: &[&str]) -> CitrusResult<()> {
        let context = TestContext::new();
        let options = XmlValidationContext {
            ignore_expressions: ignore.iter().map(|s| s.to_string()).collect(),
        };
        XmlMessageValidator.validate(
            &Message::new(received),
            &Message::new(control),
            &context,
            &[ValidationContext::Xml(options)],
        )
    }

    const ORDER: &str = r#"<order xmlns="http://citrusframework.org/order" version="2">
        <id>1001</id>
        <item sku="a-1">Apple</item>
        <created>2024-01-01T10:00:00</created>
    </order>"#;

    #[test]
    fn test_equal_documents_with_whitespace() {
        let control = r#"<order xmlns="http://citrusframework.org/order" version="2"><id>1001</id><item sku="a-1">Apple</item><created>2024-01-01T10:00:00</created></order>"#;
        assert!(validate(ORDER, control, &[]).is_ok());
    }

    #[test]
    fn test_text_and_attribute_mismatch() {
        let control = ORDER.replace("Apple", "Pear");
        let err = validate(ORDER, &control, &[]).unwrap_err();
        assert!(err.to_string().contains("'/order/item', expected 'Pear' but was 'Apple'"));

        let control = ORDER.replace("version=\"2\"", "version=\"3\"");
        let err = validate(ORDER, &control, &[]).unwrap_err();
        assert!(err.to_string().contains("/order/@version"));
    }

    #[test]
    fn test_namespace_and_structure_mismatch() {
        let control = ORDER.replace("citrusframework.org/order", "citrusframework.org/other");
        let err = validate(ORDER, &control, &[]).unwrap_err();
        assert!(err.to_string().contains("namespace not equal"));

        let control = ORDER.replace("<id>1001</id>", "");
        let err = validate(ORDER, &control, &[]).unwrap_err();
        assert!(err.to_string().contains("Number of child elements not equal"));
    }

    #[test]
    fn test_ignore_placeholder_and_expressions() {
        let control = ORDER
            .replace("2024-01-01T10:00:00", "@ignore@")
            .replace("1001", "@isNumber()@");
        assert!(validate(ORDER, &control, &[]).is_ok());

        let control = ORDER
            .replace("2024-01-01T10:00:00", "1999")
            .replace("sku=\"a-1\"", "sku=\"b-2\"")
            .replace("version=\"2\"", "version=\"9\"");
        assert!(validate(ORDER, &control, &["//created", "/order/item/@sku", "/order/@version"]).is_ok());
    }

    #[test]
    fn test_variable_matcher_uses_local_names() {
        let context = TestContext::new();
        let control = ORDER
            .replace("1001", "@variable()@")
            .replace("sku=\"a-1\"", "sku=\"@variable()@\"");
        XmlMessageValidator
            .validate(&Message::new(ORDER), &Message::new(&control), &context, &[])
            .unwrap();
        assert_eq!(context.get_variable("id").unwrap(), "1001");
        assert_eq!(context.get_variable("sku").unwrap(), "a-1");
        assert!(!context.has_variable("/order/id"));
    }

    #[test]
    fn test_control_is_resolved_once() {
        let context = TestContext::new();
        context.set_variable("template", "Hello ${user}").unwrap();
        let received = "<greeting><text>Hello ${user}</text><raw>${user}</raw></greeting>";
        let control = "<greeting><text>${template}</text><raw>${//user//}</raw></greeting>";
        assert!(XmlMessageValidator
            .validate(&Message::new(received), &Message::new(control), &context, &[])
            .is_ok());
    }

    #[test]
    fn test_invalid_ignore_expression() {
        assert!(validate(ORDER, ORDER, &["created"]).is_err());
    }
}
