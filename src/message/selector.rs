use std::collections::BTreeMap;
use std::fmt;

use super::Message;
use crate::error::{CitrusError, CitrusResult};

/// Header based message selector.
///
/// Supports expressions of the form `key = 'value' AND other = 'value'`.
/// Values may be unquoted when they contain no whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSelector {
    conditions: BTreeMap<String, String>,
}

impl MessageSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector from key/value pairs
    pub fn from_map(conditions: BTreeMap<String, String>) -> Self {
        Self { conditions }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Parse a selector expression
    pub fn parse(expression: &str) -> CitrusResult<Self> {
        let mut conditions = BTreeMap::new();
        if expression.trim().is_empty() {
            return Ok(Self { conditions });
        }

        for part in split_and(expression) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CitrusError::parse(
                    "message selector",
                    format!("invalid condition '{}' in '{}'", part.trim(), expression),
                )
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(CitrusError::parse(
                    "message selector",
                    format!("missing key in condition '{}'", part.trim()),
                ));
            }

            let value = value.trim();
            let value = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(value);

            conditions.insert(key.to_string(), value.to_string());
        }

        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &BTreeMap<String, String> {
        &self.conditions
    }

    /// Check whether all conditions match the message headers
    pub fn matches(&self, message: &Message) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            message
                .header_value(key)
                .map(|actual| &actual == expected)
                .unwrap_or(false)
        })
    }
}

// Split at AND keywords outside of quotes
fn split_and(expression: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_quotes = !in_quotes;
        }

        if !in_quotes && c.is_whitespace() && i + 4 < chars.len() {
            let keyword: String = chars[i + 1..i + 4].iter().collect();
            if keyword.eq_ignore_ascii_case("and") && chars[i + 4].is_whitespace() {
                parts.push(std::mem::take(&mut current));
                i += 5;
                continue;
            }
        }

        current.push(c);
        i += 1;
    }

    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

impl fmt::Display for MessageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expression = self
            .conditions
            .iter()
            .map(|(key, value)| format!("{} = '{}'", key, value))
            .collect::<Vec<_>>()
            .join(" AND ");
        write!(f, "{}", expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        let selector = MessageSelector::parse("operation = 'say hello' AND id=42").unwrap();
        assert_eq!(selector.conditions().get("operation").unwrap(), "say hello");
        assert_eq!(selector.conditions().get("id").unwrap(), "42");
        assert_eq!(selector.to_string(), "id = '42' AND operation = 'say hello'");
    }

    #[test]
    fn test_selector_keeps_and_inside_quotes() {
        let selector = MessageSelector::parse("text = 'salt and pepper'").unwrap();
        assert_eq!(selector.conditions().get("text").unwrap(), "salt and pepper");
    }

    #[test]
    fn test_selector_matches() {
        let message = Message::new("").with_header("operation", "greet").with_name("hello");
        assert!(MessageSelector::parse("operation = 'greet'").unwrap().matches(&message));
        assert!(MessageSelector::parse("citrus_message_name = 'hello'").unwrap().matches(&message));
        assert!(!MessageSelector::parse("operation = 'other'").unwrap().matches(&message));
        assert!(MessageSelector::parse("operation 'greet'").is_err());
    }
}
