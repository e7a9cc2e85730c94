//! Test cases, their YAML and XML representations and the runner executing
//! them.

pub mod events;
pub mod runner;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::actions::builtin::VariableDefinition;
use crate::dsl::ActionDefinition;
use crate::error::{CitrusError, CitrusResult, ErrorCode};

pub use events::{EventBus, EventBusStats, TestEvent, TestEventKind};
pub use runner::TestRunner;

/// Configuration files that are never loaded as tests
const CONFIG_FILE_NAMES: &[&str] = &["citrus.yaml", "citrus.yml"];

/// A test: variables, actions and finally actions that always run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Test variables, resolved in order so later values may use earlier ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDefinition>,
    pub actions: Vec<ActionDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finally: Vec<ActionDefinition>,
}

impl TestCase {
    pub fn from_yaml(content: &str) -> CitrusResult<Self> {
        let test: TestCase = serde_yaml::from_str(content)?;
        test.checked()
    }

    pub fn from_xml(content: &str) -> CitrusResult<Self> {
        xml::from_xml(content)?.checked()
    }

    fn checked(self) -> CitrusResult<Self> {
        if self.name.trim().is_empty() {
            return Err(CitrusError::config_invalid("name", "test name must not be empty"));
        }
        Ok(self)
    }

    /// Load a `.xml` test or a YAML test
    pub fn load(path: impl AsRef<Path>) -> CitrusResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CitrusError::runtime(format!("Failed to read test '{}': {}", path.display(), e)))?;
        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("xml") => Self::from_xml(&content),
            _ => Self::from_yaml(&content),
        };
        let test = parsed.map_err(|e| {
            CitrusError::parse("test case", format!("{}: {}", path.display(), e))
        })?;
        debug!(test = %test.name, path = %path.display(), "Loaded test case");
        Ok(test)
    }
}

fn is_test_file(path: &Path) -> bool {
    let is_test = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml") | Some("xml")
    );
    let is_config = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| CONFIG_FILE_NAMES.contains(&name))
        .unwrap_or(false);
    is_test && !is_config
}

/// Load a test file, or all YAML and XML tests of a directory tree sorted by path
pub fn load_tests(path: impl AsRef<Path>) -> CitrusResult<Vec<TestCase>> {
    let path = path.as_ref();
    if path.is_file() {
        return Ok(vec![TestCase::load(path)?]);
    }

    let mut files = Vec::new();
    collect_test_files(path, &mut files)?;
    files.sort();

    let tests = files.iter().map(TestCase::load).collect::<CitrusResult<Vec<_>>>()?;
    info!(path = %path.display(), count = tests.len(), "Loaded test cases");
    Ok(tests)
}

fn collect_test_files(dir: &Path, files: &mut Vec<PathBuf>) -> CitrusResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CitrusError::runtime(format!("Failed to read test directory '{}': {}", dir.display(), e)))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_test_files(&path, files)?;
        } else if is_test_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failure,
    Skipped,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Success => write!(f, "SUCCESS"),
            TestStatus::Failure => write!(f, "FAILED"),
            TestStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Name of the action that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<String>,
}

impl TestResult {
    pub fn success(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Success,
            duration_ms,
            error: None,
            error_code: None,
            failed_action: None,
        }
    }

    pub fn failure(name: impl Into<String>, duration_ms: u64, error: &CitrusError, action: Option<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Failure,
            duration_ms,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            failed_action: action,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TestStatus::Success
    }
}

/// Outcome of a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResult {
    pub name: String,
    pub started: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|result| result.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn success(&self) -> usize {
        self.count(TestStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Share of successful tests in percent, one decimal place
    pub fn success_percentage(&self) -> f64 {
        percentage(self.success(), self.total())
    }

    pub fn failed_percentage(&self) -> f64 {
        percentage(self.failed(), self.total())
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}
