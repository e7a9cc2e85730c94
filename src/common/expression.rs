//! Boolean expressions used by iterate, repeat and conditional containers,
//! e.g. `i lt 5 and (x = 3 or true)`.

use tracing::debug;

use crate::error::{CitrusError, CitrusResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Number(i64),
    Bool(bool),
    Operator(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Number(i64),
    Bool(bool),
}

const COMPARISON_OPERATORS: [&str; 9] = ["lt", "lt=", "gt", "gt=", "<", "<=", ">", ">=", "="];

/// Evaluate a boolean expression
pub fn evaluate(expression: &str) -> CitrusResult<bool> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        expression,
    };

    let value = parser.parse_or()?;
    if parser.position < parser.tokens.len() {
        return Err(parser.error("unexpected trailing tokens"));
    }

    let result = match value {
        Value::Bool(result) => result,
        Value::Number(n) => n != 0,
    };
    debug!(expression, result, "Boolean expression evaluated");
    Ok(result)
}

fn tokenize(expression: &str) -> CitrusResult<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let number = digits.parse().map_err(|_| {
                CitrusError::runtime(format!("Invalid number '{}' in expression '{}'", digits, expression))
            })?;
            tokens.push(Token::Number(number));
        } else {
            let start = i;
            while i < chars.len()
                && !chars[i].is_ascii_digit()
                && !chars[i].is_whitespace()
                && chars[i] != '('
                && chars[i] != ')'
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                "and" | "or" => Token::Operator(word),
                op if COMPARISON_OPERATORS.contains(&op) => Token::Operator(word),
                other => {
                    return Err(CitrusError::runtime(format!(
                        "Unknown operator '{}' in expression '{}'",
                        other, expression
                    )))
                }
            };
            tokens.push(token);
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    expression: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> CitrusError {
        CitrusError::runtime(format!(
            "Unable to parse boolean expression '{}': {}",
            self.expression, reason
        ))
    }

    fn peek_operator(&self, names: &[&str]) -> Option<String> {
        match self.tokens.get(self.position) {
            Some(Token::Operator(op)) if names.contains(&op.as_str()) => Some(op.clone()),
            _ => None,
        }
    }

    fn parse_or(&mut self) -> CitrusResult<Value> {
        let mut left = self.parse_and()?;
        while self.peek_operator(&["or"]).is_some() {
            self.position += 1;
            let right = self.parse_and()?;
            left = Value::Bool(self.as_bool(left)? || self.as_bool(right)?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CitrusResult<Value> {
        let mut left = self.parse_comparison()?;
        while self.peek_operator(&["and"]).is_some() {
            self.position += 1;
            let right = self.parse_comparison()?;
            left = Value::Bool(self.as_bool(left)? && self.as_bool(right)?);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> CitrusResult<Value> {
        let left = self.parse_operand()?;
        let Some(operator) = self.peek_operator(&COMPARISON_OPERATORS) else {
            return Ok(left);
        };
        self.position += 1;
        let right = self.parse_operand()?;

        let result = match (left, right) {
            (Value::Number(l), Value::Number(r)) => match operator.as_str() {
                "lt" | "<" => l < r,
                "lt=" | "<=" => l <= r,
                "gt" | ">" => l > r,
                "gt=" | ">=" => l >= r,
                _ => l == r,
            },
            (Value::Bool(l), Value::Bool(r)) if operator == "=" => l == r,
            _ => return Err(self.error(&format!("operator '{}' requires numeric operands", operator))),
        };
        Ok(Value::Bool(result))
    }

    fn parse_operand(&mut self) -> CitrusResult<Value> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.error("expression is incomplete"))?;
        self.position += 1;

        match token {
            Token::Number(n) => Ok(Value::Number(n)),
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Open => {
                let value = self.parse_or()?;
                match self.tokens.get(self.position) {
                    Some(Token::Close) => {
                        self.position += 1;
                        Ok(value)
                    }
                    _ => Err(self.error("missing closing parenthesis")),
                }
            }
            Token::Close => Err(self.error("unexpected closing parenthesis")),
            Token::Operator(op) => Err(self.error(&format!("unexpected operator '{}'", op))),
        }
    }

    fn as_bool(&self, value: Value) -> CitrusResult<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Number(1) => Ok(true),
            Value::Number(0) => Ok(false),
            Value::Number(n) => Err(self.error(&format!("'{}' is not a boolean value", n))),
        }
    }
}

/// Replace whole-word occurrences of an index variable name with its value
pub fn replace_index(expression: &str, index_name: &str, index: usize) -> String {
    let pattern = format!(r"\b{}\b", regex::escape(index_name));
    match regex::Regex::new(&pattern) {
        Ok(regex) => regex.replace_all(expression, index.to_string().as_str()).into_owned(),
        Err(_) => expression.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons() {
        assert!(evaluate("1 lt 5").unwrap());
        assert!(evaluate("5 lt= 5").unwrap());
        assert!(!evaluate("3 gt 4").unwrap());
        assert!(evaluate("4 >= 4").unwrap());
        assert!(evaluate("1<2").unwrap());
        assert!(evaluate("3 = 3").unwrap());
    }

    #[test]
    fn test_boolean_logic_and_parentheses() {
        assert!(evaluate("true").unwrap());
        assert!(!evaluate("false or (1 gt 2)").unwrap());
        assert!(evaluate("(1 lt 2) and (2 lt 3)").unwrap());
        assert!(evaluate("1 gt 2 or 2 gt 1 and true").unwrap());
        assert!(evaluate("true = true").unwrap());
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(evaluate("1 lt").is_err());
        assert!(evaluate("1 foo 2").is_err());
        assert!(evaluate("(1 lt 2").is_err());
        assert!(evaluate("5 and true").is_err());
    }

    #[test]
    fn test_replace_index() {
        assert_eq!(replace_index("i lt 5", "i", 3), "3 lt 5");
        assert_eq!(replace_index("index lt 5 and i gt 0", "i", 1), "index lt 5 and 1 gt 0");
    }
}
