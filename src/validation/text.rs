use regex::Regex;
use tracing::debug;

use super::matcher::{self, is_matcher_expression};
use super::{MessageValidator, ValidationContext};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageType};

/// Plain text validation with `@ignore@` segments and whitespace options
pub struct PlainTextMessageValidator;

impl MessageValidator for PlainTextMessageValidator {
    fn name(&self) -> &str {
        "plaintext"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Plaintext
    }

    fn validate(
        &self,
        received: &Message,
        control: &Message,
        context: &TestContext,
        contexts: &[ValidationContext],
    ) -> CitrusResult<()> {
        if control.payload.is_empty() {
            debug!("Skip plain text validation as no control payload was provided");
            return Ok(());
        }

        let options = contexts
            .iter()
            .find_map(|ctx| match ctx {
                ValidationContext::PlainText(options) => Some(options.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let mut control_text = context.replace_dynamic_content(&control.payload)?;
        let mut received_text = received.payload.clone();

        if options.ignore_new_line {
            control_text = normalize_new_lines(&control_text);
            received_text = normalize_new_lines(&received_text);
        }
        if options.ignore_whitespace {
            control_text = normalize_whitespace(&control_text);
            received_text = normalize_whitespace(&received_text);
        }

        if control_text.contains("@ignore") {
            if ignore_pattern(&control_text)?.is_match(&received_text) {
                return Ok(());
            }
        } else if is_matcher_expression(&control_text) {
            return matcher::validate_resolved_value("payload", &received_text, &control_text, context);
        } else if received_text == control_text {
            return Ok(());
        }

        Err(CitrusError::validation(format!(
            "Text values not equal, expected '{}' but was '{}'",
            control_text, received_text
        )))
    }
}

/// Regex for a control text with `@ignore@` (any text) and `@ignore(n)@`
/// (n characters, fewer when it ends the text) placeholders
fn ignore_pattern(control: &str) -> CitrusResult<Regex> {
    let placeholders = Regex::new(r"@ignore(?:\((\d+)\))?@")
        .map_err(|e| CitrusError::runtime(format!("Invalid ignore pattern: {}", e)))?;

    let mut pattern = String::from("^(?s:");
    let mut last = 0;
    for captures in placeholders.captures_iter(control) {
        let Some(placeholder) = captures.get(0) else {
            continue;
        };
        pattern.push_str(&regex::escape(&control[last..placeholder.start()]));
        match captures.get(1) {
            Some(count) if placeholder.end() == control.len() => pattern.push_str(&format!(".{{0,{}}}", count.as_str())),
            Some(count) => pattern.push_str(&format!(".{{{}}}", count.as_str())),
            None => pattern.push_str(".*?"),
        }
        last = placeholder.end();
    }
    pattern.push_str(&regex::escape(&control[last..]));
    pattern.push_str(")$");

    Regex::new(&pattern).map_err(|e| CitrusError::runtime(format!("Invalid text pattern: {}", e)))
}

fn normalize_new_lines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim_end_matches('\n').to_string()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::PlainTextValidationContext;

    fn validate(received: &str, control: &str, options: PlainTextValidationContext) -> CitrusResult<()> {
        let context = TestContext::new();
        PlainTextMessageValidator.validate(
            &Message::new(received),
            &Message::new(control),
            &context,
            &[ValidationContext::PlainText(options)],
        )
    }

    #[test]
    fn test_plain_text() {
        assert!(validate("Hello World", "Hello World", Default::default()).is_ok());
        let err = validate("Hello World", "Hello", Default::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: Text values not equal, expected 'Hello' but was 'Hello World'"
        );
    }

    #[test]
    fn test_ignore_segments_and_matchers() {
        assert!(validate("Hello 42 times", "Hello @ignore@ times", Default::default()).is_ok());
        assert!(validate("Order (id=7)", "Order (id=@ignore@)", Default::default()).is_ok());
        assert!(validate("Hello World", "@startsWith('Hello')@", Default::default()).is_ok());
    }

    #[test]
    fn test_ignore_character_count() {
        assert!(validate("1a2b3c4d_5e6f7g8h", "1a@ignore(4)@4d_@ignore(6)@8h", Default::default()).is_ok());
        assert!(validate("1a2b3c4d_5e6f7g8h", "1a@ignore(3)@4d_@ignore(6)@8h", Default::default()).is_err());

        let received = "Hello World, time is 1700000000000!";
        assert!(validate(received, "@ignore(11)@, time is @ignore@!", Default::default()).is_ok());
        assert!(validate(received, "Hello @ignore@, time is @ignore(100)@", Default::default()).is_ok());
        assert!(validate(received, "@ignore(5)@, time is @ignore@!", Default::default()).is_err());
        assert!(validate(received, "@ignore@", Default::default()).is_ok());
    }

    #[test]
    fn test_escaped_variable_is_resolved_once() {
        assert!(validate("Hello ${user}", "Hello ${//user//}", Default::default()).is_ok());
    }

    #[test]
    fn test_whitespace_options() {
        let options = PlainTextValidationContext {
            ignore_whitespace: true,
            ignore_new_line: true,
        };
        assert!(validate("Hello   \r\n World\n", "Hello World", options).is_ok());
        assert!(validate("Hello   World", "Hello World", Default::default()).is_err());
    }
}
