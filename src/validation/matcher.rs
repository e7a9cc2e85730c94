//! Validation matchers: `@name(args)@` expressions in control values.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::common::date_format::{self, DEFAULT_DATE_PATTERN};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::functions::split_arguments;
use crate::settings::{IGNORE_PLACEHOLDER, VALIDATION_MATCHER_DELIMITER};

/// Matcher validating a received value against matcher parameters
pub trait ValidationMatcher: Send + Sync {
    fn validate(
        &self,
        field: &str,
        value: &str,
        params: &[String],
        context: &TestContext,
    ) -> CitrusResult<()>;
}

impl<F> ValidationMatcher for F
where
    F: Fn(&str, &str, &[String], &TestContext) -> CitrusResult<()> + Send + Sync,
{
    fn validate(
        &self,
        field: &str,
        value: &str,
        params: &[String],
        context: &TestContext,
    ) -> CitrusResult<()> {
        self(field, value, params, context)
    }
}

/// Registry of named validation matchers
#[derive(Default)]
pub struct ValidationMatcherRegistry {
    matchers: DashMap<String, Arc<dyn ValidationMatcher>>,
}

impl ValidationMatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        register_defaults(&registry);
        registry
    }

    pub fn register(&self, name: impl Into<String>, matcher: impl ValidationMatcher + 'static) {
        self.matchers.insert(name.into(), Arc::new(matcher));
    }

    pub fn get(&self, name: &str) -> CitrusResult<Arc<dyn ValidationMatcher>> {
        self.matchers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CitrusError::NoSuchValidationMatcher {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.matchers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Validate a value with a `@matcher(args)@` expression
    pub fn validate(
        &self,
        field: &str,
        value: &str,
        expression: &str,
        context: &TestContext,
    ) -> CitrusResult<()> {
        let (name, params) = parse_matcher_expression(expression)?;
        debug!(field, matcher = %name, "Validating value with matcher");
        self.get(&name)?.validate(field, value, &params, context)
    }
}

/// Check whether a control value is a matcher expression
pub fn is_matcher_expression(control: &str) -> bool {
    let control = control.trim();
    control.len() > 2
        && control.starts_with(VALIDATION_MATCHER_DELIMITER)
        && control.ends_with(VALIDATION_MATCHER_DELIMITER)
}

/// Split `@name(a, 'b')@` into name and parameters
pub fn parse_matcher_expression(expression: &str) -> CitrusResult<(String, Vec<String>)> {
    let inner = expression
        .trim()
        .strip_prefix(VALIDATION_MATCHER_DELIMITER)
        .and_then(|e| e.strip_suffix(VALIDATION_MATCHER_DELIMITER))
        .ok_or_else(|| {
            CitrusError::runtime(format!("Invalid validation matcher expression '{}'", expression))
        })?
        .trim();

    match inner.find('(') {
        Some(open) if inner.ends_with(')') => Ok((
            inner[..open].trim().to_string(),
            split_arguments(&inner[open + 1..inner.len() - 1]),
        )),
        Some(_) => Err(CitrusError::runtime(format!(
            "Invalid validation matcher expression '{}': missing closing parenthesis",
            expression
        ))),
        None => Ok((inner.to_string(), Vec::new())),
    }
}

/// Validate a received value against a control value.
///
/// The control value is resolved first. `@ignore@` skips the check, matcher
/// expressions are delegated to the matcher library, everything else must be
/// equal.
pub fn validate_value(
    field: &str,
    received: &str,
    control: &str,
    context: &TestContext,
) -> CitrusResult<()> {
    if control.trim() == IGNORE_PLACEHOLDER {
        debug!(field, "Ignoring value");
        return Ok(());
    }

    let control = context.replace_dynamic_content(control)?;
    validate_resolved_value(field, received, &control, context)
}

/// Like [`validate_value`] for control values that are already resolved
pub fn validate_resolved_value(
    field: &str,
    received: &str,
    control: &str,
    context: &TestContext,
) -> CitrusResult<()> {
    if control.trim() == IGNORE_PLACEHOLDER {
        debug!(field, "Ignoring value");
        return Ok(());
    }

    if is_matcher_expression(control) {
        return context.matchers().validate(field, received, control, context);
    }

    if received != control {
        return Err(CitrusError::validation(format!(
            "Values not equal for '{}', expected '{}' but was '{}'",
            field, control, received
        )));
    }
    Ok(())
}

fn matcher_error(matcher: &str, field: &str, value: &str, control: &str) -> CitrusError {
    CitrusError::validation(format!(
        "{} failed for field '{}'. Received value is '{}', control value is '{}'",
        matcher, field, value, control
    ))
}

fn param<'a>(matcher: &str, params: &'a [String]) -> CitrusResult<&'a str> {
    params.first().map(String::as_str).ok_or_else(|| {
        CitrusError::runtime(format!("Validation matcher '{}' requires a parameter", matcher))
    })
}

fn numeric(matcher: &str, field: &str, value: &str) -> CitrusResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| matcher_error(matcher, field, value, "<number>"))
}

fn string_length(field: &str, value: &str, params: &[String], _: &TestContext) -> CitrusResult<()> {
    let control = param("stringLength", params)?;
    let expected: usize = control
        .trim()
        .parse()
        .map_err(|_| CitrusError::runtime(format!("Invalid length parameter '{}'", control)))?;
    if value.chars().count() == expected {
        Ok(())
    } else {
        Err(matcher_error("StringLengthValidationMatcher", field, value, control))
    }
}

/// Register all default matchers
pub fn register_defaults(registry: &ValidationMatcherRegistry) {
    registry.register("ignore", |_: &str, _: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        Ok(())
    });

    registry.register(
        "equalsIgnoreCase",
        |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
            let control = param("equalsIgnoreCase", params)?;
            if value.to_lowercase() == control.to_lowercase() {
                Ok(())
            } else {
                Err(matcher_error("EqualsIgnoreCaseValidationMatcher", field, value, control))
            }
        },
    );

    registry.register(
        "ignoreNewLine",
        |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
            let control = param("ignoreNewLine", params)?;
            let strip = |s: &str| s.replace(['\r', '\n'], "");
            if strip(value) == strip(control) {
                Ok(())
            } else {
                Err(matcher_error("IgnoreNewLineValidationMatcher", field, value, control))
            }
        },
    );

    registry.register("trim", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("trim", params)?;
        if value.trim() == control.trim() {
            Ok(())
        } else {
            Err(matcher_error("TrimValidationMatcher", field, value, control))
        }
    });

    registry.register(
        "trimAllWhitespaces",
        |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
            let control = param("trimAllWhitespaces", params)?;
            let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
            if strip(value) == strip(control) {
                Ok(())
            } else {
                Err(matcher_error("TrimAllWhitespacesValidationMatcher", field, value, control))
            }
        },
    );

    registry.register("contains", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("contains", params)?;
        if value.contains(control) {
            Ok(())
        } else {
            Err(matcher_error("ContainsValidationMatcher", field, value, control))
        }
    });

    registry.register(
        "containsIgnoreCase",
        |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
            let control = param("containsIgnoreCase", params)?;
            if value.to_lowercase().contains(&control.to_lowercase()) {
                Ok(())
            } else {
                Err(matcher_error("ContainsIgnoreCaseValidationMatcher", field, value, control))
            }
        },
    );

    registry.register("startsWith", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("startsWith", params)?;
        if value.starts_with(control) {
            Ok(())
        } else {
            Err(matcher_error("StartsWithValidationMatcher", field, value, control))
        }
    });

    registry.register("endsWith", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("endsWith", params)?;
        if value.ends_with(control) {
            Ok(())
        } else {
            Err(matcher_error("EndsWithValidationMatcher", field, value, control))
        }
    });

    registry.register("matches", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("matches", params)?;
        let regex = regex::Regex::new(&format!("^(?:{})$", control)).map_err(|e| {
            CitrusError::runtime(format!("Invalid regular expression '{}': {}", control, e))
        })?;
        if regex.is_match(value) {
            Ok(())
        } else {
            Err(matcher_error("MatchesValidationMatcher", field, value, control))
        }
    });

    registry.register(
        "matchesDatePattern",
        |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
            let control = param("matchesDatePattern", params)?;
            if date_format::matches_date_pattern(value, control)? {
                Ok(())
            } else {
                Err(matcher_error("DatePatternValidationMatcher", field, value, control))
            }
        },
    );

    registry.register("isNumber", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        numeric("NumericValidationMatcher", field, value).map(|_| ())
    });

    registry.register("greaterThan", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("greaterThan", params)?;
        let limit = numeric("GreaterThanValidationMatcher", field, control)?;
        if numeric("GreaterThanValidationMatcher", field, value)? > limit {
            Ok(())
        } else {
            Err(matcher_error("GreaterThanValidationMatcher", field, value, control))
        }
    });

    registry.register("lowerThan", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("lowerThan", params)?;
        let limit = numeric("LowerThanValidationMatcher", field, control)?;
        if numeric("LowerThanValidationMatcher", field, value)? < limit {
            Ok(())
        } else {
            Err(matcher_error("LowerThanValidationMatcher", field, value, control))
        }
    });

    registry.register("empty", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        if value.is_empty() {
            Ok(())
        } else {
            Err(matcher_error("EmptyValidationMatcher", field, value, ""))
        }
    });

    registry.register("notEmpty", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        if value.is_empty() {
            Err(matcher_error("NotEmptyValidationMatcher", field, value, "<not empty>"))
        } else {
            Ok(())
        }
    });

    registry.register("null", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        if value == "null" {
            Ok(())
        } else {
            Err(matcher_error("NullValidationMatcher", field, value, "null"))
        }
    });

    registry.register("notNull", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        if value == "null" {
            Err(matcher_error("NotNullValidationMatcher", field, value, "<not null>"))
        } else {
            Ok(())
        }
    });

    registry.register("isUUID", |field: &str, value: &str, _: &[String], _: &TestContext| -> CitrusResult<()> {
        uuid::Uuid::parse_str(value)
            .map(|_| ())
            .map_err(|_| matcher_error("UuidValidationMatcher", field, value, "<uuid>"))
    });

    registry.register("stringLength", string_length);
    registry.register("hasLength", string_length);

    registry.register("isWeekday", |field: &str, value: &str, params: &[String], _: &TestContext| -> CitrusResult<()> {
        let control = param("isWeekday", params)?;
        let pattern = params.get(1).map(String::as_str).unwrap_or(DEFAULT_DATE_PATTERN);
        let date = date_format::parse_date(value, pattern)?;
        let weekday = chrono::Datelike::weekday(&date).to_string();
        // chrono prints abbreviated names (Mon, Tue, ...)
        if control.to_ascii_lowercase().starts_with(&weekday.to_ascii_lowercase()) {
            Ok(())
        } else {
            Err(matcher_error("WeekdayValidationMatcher", field, value, control))
        }
    });

    registry.register("variable", |field: &str, value: &str, params: &[String], context: &TestContext| -> CitrusResult<()> {
        let name = params
            .first()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(field);
        context.set_variable(name, value)
    });
}
