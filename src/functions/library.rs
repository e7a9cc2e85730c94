//! Default function library.

use base64::Engine;
use chrono::Utc;

use super::FunctionRegistry;
use crate::common::date_format::{self, DEFAULT_DATE_PATTERN};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};

/// Register all default functions
pub fn register_defaults(registry: &FunctionRegistry) {
    registry.register("concat", concat);
    registry.register("substring", substring);
    registry.register("stringLength", string_length);
    registry.register("translate", translate);
    registry.register("upperCase", upper_case);
    registry.register("lowerCase", lower_case);
    registry.register("randomNumber", random_number);
    registry.register("randomString", random_string);
    registry.register("randomUUID", random_uuid);
    registry.register("randomEnumValue", random_enum_value);
    registry.register("currentDate", current_date);
    registry.register("unixTimestamp", unix_timestamp);
    registry.register("encodeBase64", encode_base64);
    registry.register("decodeBase64", decode_base64);
    registry.register("escapeXml", escape_xml);
    registry.register("absolute", absolute);
    registry.register("ceiling", ceiling);
    registry.register("floor", floor);
    registry.register("round", round);
    registry.register("max", max);
    registry.register("min", min);
    registry.register("sum", sum);
    registry.register("average", average);
    registry.register("env", env);
    registry.register("systemProperty", env);
    registry.register("readFile", read_file);
}

fn arg<'a>(function: &str, args: &'a [String], index: usize) -> CitrusResult<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        CitrusError::runtime(format!(
            "Function '{}' is missing parameter at position {}",
            function,
            index + 1
        ))
    })
}

fn number(function: &str, value: &str) -> CitrusResult<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        CitrusError::runtime(format!(
            "Function '{}' expects numeric parameter but was '{}'",
            function, value
        ))
    })
}

fn usize_arg(function: &str, value: &str) -> CitrusResult<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        CitrusError::runtime(format!(
            "Function '{}' expects a positive number but was '{}'",
            function, value
        ))
    })
}

/// Format a number without a fraction when it is integral
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn numbers(function: &str, args: &[String]) -> CitrusResult<Vec<f64>> {
    if args.is_empty() {
        return Err(CitrusError::runtime(format!(
            "Function '{}' requires at least one parameter",
            function
        )));
    }
    args.iter().map(|value| number(function, value)).collect()
}

fn concat(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(args.concat())
}

fn substring(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let value = arg("substring", args, 0)?;
    let begin = usize_arg("substring", arg("substring", args, 1)?)?;
    let chars: Vec<char> = value.chars().collect();
    let end = match args.get(2) {
        Some(end) => usize_arg("substring", end)?,
        None => chars.len(),
    };

    if begin > end || end > chars.len() {
        return Err(CitrusError::runtime(format!(
            "Invalid substring range {}..{} for '{}'",
            begin, end, value
        )));
    }
    Ok(chars[begin..end].iter().collect())
}

fn string_length(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(arg("stringLength", args, 0)?.chars().count().to_string())
}

fn translate(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let value = arg("translate", args, 0)?;
    let pattern = arg("translate", args, 1)?;
    let replacement = arg("translate", args, 2)?;
    let regex = regex::Regex::new(pattern)
        .map_err(|e| CitrusError::runtime(format!("Invalid regular expression '{}': {}", pattern, e)))?;
    Ok(regex.replace_all(value, replacement).into_owned())
}

fn upper_case(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(arg("upperCase", args, 0)?.to_uppercase())
}

fn lower_case(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(arg("lowerCase", args, 0)?.to_lowercase())
}

fn random_number(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let length = usize_arg("randomNumber", arg("randomNumber", args, 0)?)?;
    if length == 0 {
        return Err(CitrusError::runtime("Function 'randomNumber' requires a length greater than zero"));
    }
    let padding = args.get(1).map(|p| p.trim() != "false").unwrap_or(true);

    let mut digits = String::with_capacity(length);
    for index in 0..length {
        let digit = if index == 0 && !padding {
            fastrand::u8(1..=9)
        } else {
            fastrand::u8(0..=9)
        };
        digits.push(char::from(b'0' + digit));
    }
    Ok(digits)
}

fn random_string(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let length = usize_arg("randomString", arg("randomString", args, 0)?)?;
    let notation = args.get(1).map(|n| n.to_ascii_uppercase()).unwrap_or_else(|| "MIXED".to_string());
    let with_numbers = args.get(2).map(|n| n.trim() == "true").unwrap_or(false);

    let mut alphabet: Vec<char> = match notation.as_str() {
        "UPPERCASE" => ('A'..='Z').collect(),
        "LOWERCASE" => ('a'..='z').collect(),
        _ => ('a'..='z').chain('A'..='Z').collect(),
    };
    if with_numbers {
        alphabet.extend('0'..='9');
    }

    Ok((0..length)
        .map(|_| alphabet[fastrand::usize(..alphabet.len())])
        .collect())
}

fn random_uuid(_: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(uuid::Uuid::new_v4().to_string())
}

fn random_enum_value(args: &[String], _: &TestContext) -> CitrusResult<String> {
    if args.is_empty() {
        return Err(CitrusError::runtime("Function 'randomEnumValue' requires at least one value"));
    }
    Ok(args[fastrand::usize(..args.len())].clone())
}

fn current_date(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let pattern = args
        .first()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_DATE_PATTERN);
    let date = match args.get(1) {
        Some(offset) => date_format::apply_offset(Utc::now(), offset)?,
        None => Utc::now(),
    };
    date_format::format_date(&date, pattern)
}

fn unix_timestamp(_: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(Utc::now().timestamp().to_string())
}

fn encode_base64(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(base64::engine::general_purpose::STANDARD.encode(arg("encodeBase64", args, 0)?))
}

fn decode_base64(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(arg("decodeBase64", args, 0)?.trim())
        .map_err(|e| CitrusError::runtime(format!("Failed to decode base64 value: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| CitrusError::runtime(format!("Decoded base64 value is not UTF-8: {}", e)))
}

/// Escape XML special characters
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_xml(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(xml_escape(arg("escapeXml", args, 0)?))
}

fn absolute(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(format_number(number("absolute", arg("absolute", args, 0)?)?.abs()))
}

fn ceiling(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(format_number(number("ceiling", arg("ceiling", args, 0)?)?.ceil()))
}

fn floor(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(format_number(number("floor", arg("floor", args, 0)?)?.floor()))
}

fn round(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(format_number(number("round", arg("round", args, 0)?)?.round()))
}

fn max(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let values = numbers("max", args)?;
    Ok(format_number(values.into_iter().fold(f64::MIN, f64::max)))
}

fn min(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let values = numbers("min", args)?;
    Ok(format_number(values.into_iter().fold(f64::MAX, f64::min)))
}

fn sum(args: &[String], _: &TestContext) -> CitrusResult<String> {
    Ok(format_number(numbers("sum", args)?.into_iter().sum()))
}

fn average(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let values = numbers("average", args)?;
    let count = values.len() as f64;
    Ok(format_number(values.into_iter().sum::<f64>() / count))
}

fn env(args: &[String], _: &TestContext) -> CitrusResult<String> {
    let name = arg("env", args, 0)?;
    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => args.get(1).cloned().ok_or_else(|| {
            CitrusError::runtime(format!("Failed to resolve environment variable '{}'", name))
        }),
    }
}

fn read_file(args: &[String], context: &TestContext) -> CitrusResult<String> {
    let path = arg("readFile", args, 0)?;
    let base64_encode = args.get(1).map(|v| v.trim() == "true").unwrap_or(false);

    if base64_encode {
        let bytes = std::fs::read(path)
            .map_err(|e| CitrusError::Io(format!("Failed to read file '{}': {}", path, e)))?;
        return Ok(base64::engine::general_purpose::STANDARD.encode(bytes));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| CitrusError::Io(format!("Failed to read file '{}': {}", path, e)))?;
    context.replace_dynamic_content(&content)
}
