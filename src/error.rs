use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the framework
pub type CitrusResult<T> = Result<T, CitrusError>;

/// Framework runtime error.
///
/// Errors raised by wrapped libraries (HTTP, Kubernetes, SQLite, SSH, ...)
/// are converted into one of these variants with a descriptive message so
/// that test reports only ever deal with a single error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CitrusError {
    #[error("{0}")]
    Runtime(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Can not find function '{name}' in function library")]
    NoSuchFunction { name: String },

    #[error("Can not find validation matcher '{name}' in matcher library")]
    NoSuchValidationMatcher { name: String },

    #[error("Action timeout after {timeout_ms} milliseconds. Failed to receive message on endpoint: '{endpoint}'")]
    MessageTimeout { endpoint: String, timeout_ms: u64 },

    #[error("Unable to find endpoint '{name}'")]
    EndpointNotFound { name: String },

    #[error("Invalid configuration for '{key}': {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Failed to parse {format}: {reason}")]
    Parse { format: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Endpoint '{endpoint}' failed: {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("{0}")]
    Fail(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),
}

impl CitrusError {
    pub fn runtime(message: impl Into<String>) -> Self {
        CitrusError::Runtime(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CitrusError::Validation(message.into())
    }

    pub fn unknown_variable(name: impl Into<String>) -> Self {
        CitrusError::UnknownVariable { name: name.into() }
    }

    pub fn endpoint(endpoint: impl Into<String>, reason: impl fmt::Display) -> Self {
        CitrusError::Endpoint {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        CitrusError::MessageTimeout {
            endpoint: endpoint.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn config_invalid(key: impl Into<String>, reason: impl fmt::Display) -> Self {
        CitrusError::ConfigInvalid {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(format: impl Into<String>, reason: impl fmt::Display) -> Self {
        CitrusError::Parse {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    /// Error code for programmatic handling and reports
    pub fn code(&self) -> ErrorCode {
        match self {
            CitrusError::Runtime(_) => ErrorCode::Runtime,
            CitrusError::Validation(_) => ErrorCode::ValidationFailed,
            CitrusError::UnknownVariable { .. } => ErrorCode::UnknownVariable,
            CitrusError::NoSuchFunction { .. } => ErrorCode::NoSuchFunction,
            CitrusError::NoSuchValidationMatcher { .. } => ErrorCode::NoSuchValidationMatcher,
            CitrusError::MessageTimeout { .. } => ErrorCode::MessageTimeout,
            CitrusError::EndpointNotFound { .. } => ErrorCode::EndpointNotFound,
            CitrusError::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            CitrusError::Parse { .. } => ErrorCode::ParseFailed,
            CitrusError::Io(_) => ErrorCode::Io,
            CitrusError::Endpoint { .. } => ErrorCode::EndpointFailed,
            CitrusError::Fail(_) => ErrorCode::Failed,
            CitrusError::Assertion(_) => ErrorCode::AssertionFailed,
        }
    }

    /// Broad category of the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            CitrusError::Validation(_) | CitrusError::Assertion(_) => ErrorCategory::Validation,
            CitrusError::MessageTimeout { .. } => ErrorCategory::Timeout,
            CitrusError::Endpoint { .. } | CitrusError::Io(_) => ErrorCategory::Network,
            CitrusError::ConfigInvalid { .. }
            | CitrusError::Parse { .. }
            | CitrusError::EndpointNotFound { .. } => ErrorCategory::Configuration,
            _ => ErrorCategory::Internal,
        }
    }
}

/// Error codes for different types of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Runtime,
    ValidationFailed,
    UnknownVariable,
    NoSuchFunction,
    NoSuchValidationMatcher,
    MessageTimeout,
    EndpointNotFound,
    ConfigInvalid,
    ParseFailed,
    Io,
    EndpointFailed,
    Failed,
    AssertionFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::Runtime => "runtime",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::UnknownVariable => "unknown_variable",
            ErrorCode::NoSuchFunction => "no_such_function",
            ErrorCode::NoSuchValidationMatcher => "no_such_validation_matcher",
            ErrorCode::MessageTimeout => "message_timeout",
            ErrorCode::EndpointNotFound => "endpoint_not_found",
            ErrorCode::ConfigInvalid => "config_invalid",
            ErrorCode::ParseFailed => "parse_failed",
            ErrorCode::Io => "io",
            ErrorCode::EndpointFailed => "endpoint_failed",
            ErrorCode::Failed => "failed",
            ErrorCode::AssertionFailed => "assertion_failed",
        };
        write!(f, "{}", text)
    }
}

/// Error categories used to decide whether polling loops should keep trying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Validation,
    Configuration,
    Internal,
}

impl ErrorCategory {
    /// Check if this category of error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Validation
        )
    }
}

impl From<std::io::Error> for CitrusError {
    fn from(err: std::io::Error) -> Self {
        CitrusError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CitrusError {
    fn from(err: serde_json::Error) -> Self {
        CitrusError::parse("JSON", err)
    }
}

impl From<serde_yaml::Error> for CitrusError {
    fn from(err: serde_yaml::Error) -> Self {
        CitrusError::parse("YAML", err)
    }
}

impl From<reqwest::Error> for CitrusError {
    fn from(err: reqwest::Error) -> Self {
        CitrusError::Runtime(format!("HTTP request failed: {}", err))
    }
}

impl From<kube::Error> for CitrusError {
    fn from(err: kube::Error) -> Self {
        CitrusError::Runtime(format!("Kubernetes client error: {}", err))
    }
}

impl From<rusqlite::Error> for CitrusError {
    fn from(err: rusqlite::Error) -> Self {
        CitrusError::Runtime(format!("SQL error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CitrusError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CitrusError::Runtime(format!("WebSocket error: {}", err))
    }
}

impl From<anyhow::Error> for CitrusError {
    fn from(err: anyhow::Error) -> Self {
        CitrusError::Runtime(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CitrusError::timeout("helloQueue", Duration::from_millis(500));
        assert_eq!(
            err.to_string(),
            "Action timeout after 500 milliseconds. Failed to receive message on endpoint: 'helloQueue'"
        );
        assert_eq!(err.code(), ErrorCode::MessageTimeout);
        assert!(err.category().is_retryable());

        let err = CitrusError::unknown_variable("foo");
        assert_eq!(err.to_string(), "Unknown variable 'foo'");
        assert!(!err.category().is_retryable());
    }

    #[test]
    fn test_wrapped_errors() {
        let err: CitrusError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::ParseFailed);
        assert!(err.to_string().starts_with("Failed to parse JSON"));

        let err: CitrusError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err, CitrusError::Io("missing".to_string()));
    }
}
