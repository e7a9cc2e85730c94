//! Function library: `citrus:name(args)` expressions evaluated while
//! dynamic content is resolved.

pub mod library;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::settings::FUNCTION_PREFIX;

/// A function callable from test content
pub trait Function: Send + Sync {
    fn execute(&self, args: &[String], context: &TestContext) -> CitrusResult<String>;
}

impl<F> Function for F
where
    F: Fn(&[String], &TestContext) -> CitrusResult<String> + Send + Sync,
{
    fn execute(&self, args: &[String], context: &TestContext) -> CitrusResult<String> {
        self(args, context)
    }
}

/// Registry of named functions
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the default function library
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        library::register_defaults(&registry);
        registry
    }

    pub fn register(&self, name: impl Into<String>, function: impl Function + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> CitrusResult<Arc<dyn Function>> {
        self.functions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CitrusError::NoSuchFunction {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted function names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Check whether the text is a single function expression
pub fn is_function(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(FUNCTION_PREFIX)
        && find_call(text, 0).map(|call| call.end) == Some(text.len())
}

/// Evaluate all function expressions in a text
pub fn replace_functions_in_string(text: &str, context: &TestContext) -> CitrusResult<String> {
    if !text.contains(FUNCTION_PREFIX) {
        return Ok(text.to_string());
    }

    let mut result = String::with_capacity(text.len());
    let mut position = 0;

    while let Some(offset) = text[position..].find(FUNCTION_PREFIX) {
        let start = position + offset;
        match find_call(text, start) {
            Some(call) => {
                result.push_str(&text[position..start]);
                result.push_str(&evaluate(&call, context)?);
                position = call.end;
            }
            None => {
                let skip = start + FUNCTION_PREFIX.len();
                result.push_str(&text[position..skip]);
                position = skip;
            }
        }
    }

    result.push_str(&text[position..]);
    Ok(result)
}

/// Evaluate a single `citrus:name(args)` expression
pub fn resolve_function(expression: &str, context: &TestContext) -> CitrusResult<String> {
    let expression = expression.trim();
    match find_call(expression, 0) {
        Some(call) if call.end == expression.len() => evaluate(&call, context),
        _ => Err(CitrusError::runtime(format!(
            "Invalid function expression '{}'",
            expression
        ))),
    }
}

struct FunctionCall {
    name: String,
    raw_args: String,
    end: usize,
}

// Locate `citrus:name(...)` starting at `start`, honouring nested parentheses and quotes
fn find_call(text: &str, start: usize) -> Option<FunctionCall> {
    let name_start = start + FUNCTION_PREFIX.len();
    if !text[start..].starts_with(FUNCTION_PREFIX) {
        return None;
    }

    let name_len = text[name_start..]
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .unwrap_or(text.len() - name_start);
    if name_len == 0 {
        return None;
    }

    let open = name_start + name_len;
    if !text[open..].starts_with('(') {
        return None;
    }

    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (index, c) in text[open..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    let close = open + index;
                    return Some(FunctionCall {
                        name: text[name_start..open].to_string(),
                        raw_args: text[open + 1..close].to_string(),
                        end: close + 1,
                    });
                }
            }
            _ => {}
        }
    }
    None
}

fn evaluate(call: &FunctionCall, context: &TestContext) -> CitrusResult<String> {
    let function = context.functions().get(&call.name)?;
    let args = split_arguments(&call.raw_args)
        .iter()
        .map(|arg| replace_functions_in_string(arg, context))
        .collect::<CitrusResult<Vec<String>>>()?;

    trace!(function = %call.name, ?args, "Evaluating function");
    function.execute(&args, context)
}

/// Split a raw argument list at top level commas and strip quotes
pub fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    if raw.trim().is_empty() {
        return args;
    }

    let mut current = String::new();
    let mut depth = 0;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth -= 1;
                current.push(c);
            }
            (None, ',') if depth == 0 => args.push(unquote(&std::mem::take(&mut current))),
            (None, c) => current.push(c),
        }
    }
    args.push(unquote(&current));
    args
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['\'', '"'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}
