use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::endpoints::EndpointDefinition;
use crate::error::{CitrusError, CitrusResult};

/// Prefix of a variable expression
pub const VARIABLE_PREFIX: &str = "${";
/// Suffix of a variable expression
pub const VARIABLE_SUFFIX: &str = "}";
/// Escape markers for variable expressions that must not be resolved
pub const VARIABLE_ESCAPE: &str = "//";
/// Prefix of the default function library
pub const FUNCTION_PREFIX: &str = "citrus:";
/// Placeholder that skips validation of a value
pub const IGNORE_PLACEHOLDER: &str = "@ignore@";
/// Delimiter of validation matcher expressions
pub const VALIDATION_MATCHER_DELIMITER: &str = "@";

// Default configuration values
const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_REPORT_DIRECTORY: &str = "target/citrus-reports";
const DEFAULT_MESSAGE_TYPE: &str = "json";
const DEFAULT_SUITE_NAME: &str = "citrus-default-suite";

/// Framework wide settings.
///
/// Every value falls back to a `CITRUS_*` environment variable before the
/// built-in default is used.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CitrusSettings {
    /// Default timeout for receive actions in milliseconds
    #[serde(default = "default_timeout")]
    pub default_timeout: u64,
    /// Output directory of test reports
    #[serde(default = "default_report_directory")]
    pub report_directory: PathBuf,
    /// Whether JSON validation is strict (entry counts must match)
    #[serde(default = "default_json_strict")]
    pub json_strict: bool,
    /// Message type used when neither action nor payload tells otherwise
    #[serde(default = "default_message_type")]
    pub default_message_type: String,
    /// Write JUnit XML reports
    #[serde(default = "default_junit_enabled")]
    pub junit_report: bool,
    /// Write the JSON summary report
    #[serde(default = "default_json_report_enabled")]
    pub json_report: bool,
    /// Name of the test suite used in reports
    #[serde(default = "default_suite_name")]
    pub suite_name: String,
}

impl Default for CitrusSettings {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            report_directory: default_report_directory(),
            json_strict: default_json_strict(),
            default_message_type: default_message_type(),
            junit_report: default_junit_enabled(),
            json_report: default_json_report_enabled(),
            suite_name: default_suite_name(),
        }
    }
}

impl CitrusSettings {
    /// Default receive timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout)
    }
}

pub(crate) fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

// Default functions
pub(crate) fn default_timeout() -> u64 {
    env_or("CITRUS_DEFAULT_TIMEOUT", DEFAULT_TIMEOUT_MS)
}

fn default_report_directory() -> PathBuf {
    std::env::var("CITRUS_REPORT_DIRECTORY")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_REPORT_DIRECTORY))
}

fn default_json_strict() -> bool {
    env_or("CITRUS_JSON_STRICT", true)
}

fn default_message_type() -> String {
    std::env::var("CITRUS_DEFAULT_MESSAGE_TYPE").unwrap_or_else(|_| DEFAULT_MESSAGE_TYPE.to_string())
}

fn default_junit_enabled() -> bool {
    env_or("CITRUS_REPORT_JUNIT_ENABLED", true)
}

fn default_json_report_enabled() -> bool {
    env_or("CITRUS_REPORT_JSON_ENABLED", true)
}

fn default_suite_name() -> String {
    std::env::var("CITRUS_SUITE_NAME").unwrap_or_else(|_| DEFAULT_SUITE_NAME.to_string())
}

/// Global configuration file (`citrus.yaml` or `citrus.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CitrusConfig {
    #[serde(default)]
    pub settings: CitrusSettings,
    /// Global variables visible in every test
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Endpoint and client components
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
}

impl CitrusConfig {
    /// Load the configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> CitrusResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| {
            CitrusError::config_invalid(path.display().to_string(), format!("failed to read file: {}", e))
        })?;

        let config = Self::parse(&content, path)?;
        info!(
            path = %path.display(),
            endpoints = config.endpoints.len(),
            variables = config.variables.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration content; the file extension decides the format
    pub fn parse(content: &str, path: &Path) -> CitrusResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Ok(serde_yaml::from_str(content)?),
        }
    }

    /// Look for `citrus.yaml`, `citrus.yml` or `citrus.json` in a directory
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        ["citrus.yaml", "citrus.yml", "citrus.json"]
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: CitrusConfig = serde_yaml::from_str("variables:\n  user: citrus\n").unwrap();
        assert_eq!(config.variables.get("user").unwrap(), "citrus");
        assert!(config.endpoints.is_empty());
        assert_eq!(config.settings.suite_name, default_suite_name());
    }

    #[test]
    fn test_config_json_by_extension() {
        let config = CitrusConfig::parse(
            r#"{"settings": {"defaultTimeout": 250}}"#,
            Path::new("citrus.json"),
        )
        .unwrap();
        assert_eq!(config.settings.timeout(), Duration::from_millis(250));
    }
}
