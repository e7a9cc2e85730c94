use crate::error::{CitrusError, CitrusResult};
use crate::settings::{VARIABLE_ESCAPE, VARIABLE_PREFIX, VARIABLE_SUFFIX};

/// Strip `${` and `}` from a variable expression, if present
pub fn cut_off_variable_prefix(expression: &str) -> &str {
    expression
        .strip_prefix(VARIABLE_PREFIX)
        .and_then(|name| name.strip_suffix(VARIABLE_SUFFIX))
        .unwrap_or(expression)
}

/// Check whether the whole expression is a single `${name}` reference
pub fn is_variable_name(expression: &str) -> bool {
    expression.starts_with(VARIABLE_PREFIX)
        && expression.ends_with(VARIABLE_SUFFIX)
        && expression.len() > VARIABLE_PREFIX.len() + VARIABLE_SUFFIX.len()
        && !expression[VARIABLE_PREFIX.len()..].contains(VARIABLE_PREFIX)
}

/// Replace all `${name}` references using the lookup function.
///
/// Escaped references `${//name//}` are emitted as `${name}` without lookup.
pub fn replace_variables_in_string<F>(text: &str, lookup: F) -> CitrusResult<String>
where
    F: Fn(&str) -> CitrusResult<String>,
{
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(VARIABLE_PREFIX) {
        result.push_str(&rest[..start]);
        let after_prefix = &rest[start + VARIABLE_PREFIX.len()..];

        let end = after_prefix.find(VARIABLE_SUFFIX).ok_or_else(|| {
            CitrusError::runtime(format!(
                "Unable to parse variable expression in '{}': missing '{}'",
                text, VARIABLE_SUFFIX
            ))
        })?;

        let name = &after_prefix[..end];
        if name.is_empty() {
            return Err(CitrusError::runtime(format!(
                "Unable to parse variable expression in '{}': empty variable name",
                text
            )));
        }

        match name
            .strip_prefix(VARIABLE_ESCAPE)
            .and_then(|n| n.strip_suffix(VARIABLE_ESCAPE))
        {
            Some(escaped) => {
                result.push_str(VARIABLE_PREFIX);
                result.push_str(escaped);
                result.push_str(VARIABLE_SUFFIX);
            }
            None => result.push_str(&lookup(name)?),
        }

        rest = &after_prefix[end + VARIABLE_SUFFIX.len()..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> CitrusResult<String> {
        match name {
            "user" => Ok("citrus".to_string()),
            "id" => Ok("42".to_string()),
            other => Err(CitrusError::unknown_variable(other)),
        }
    }

    #[test]
    fn test_replace_variables() {
        assert_eq!(
            replace_variables_in_string("Hello ${user} #${id}!", lookup).unwrap(),
            "Hello citrus #42!"
        );
        assert_eq!(replace_variables_in_string("no variables", lookup).unwrap(), "no variables");
    }

    #[test]
    fn test_escaped_and_invalid_variables() {
        assert_eq!(
            replace_variables_in_string("${//user//} is ${user}", lookup).unwrap(),
            "${user} is citrus"
        );
        assert_eq!(
            replace_variables_in_string("${missing}", lookup).unwrap_err(),
            CitrusError::unknown_variable("missing")
        );
        assert!(replace_variables_in_string("${user", lookup).is_err());
    }

    #[test]
    fn test_variable_name_helpers() {
        assert!(is_variable_name("${user}"));
        assert!(!is_variable_name("${a}${b}"));
        assert!(!is_variable_name("user"));
        assert_eq!(cut_off_variable_prefix("${user}"), "user");
        assert_eq!(cut_off_variable_prefix("user"), "user");
    }
}
