//! Integration test harness for Citrus
//! Provides utilities for writing YAML projects to disk and running them

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use citrus::{load_tests, CitrusConfig, SuiteResult, TestRunner};

/// A throwaway project directory holding `citrus.yaml` and YAML tests
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Create a project with the given configuration file content
    pub fn new(config: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("citrus.yaml"), config)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn report_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    /// Add a test file to the project
    pub fn with_test(self, file_name: &str, content: &str) -> Result<Self> {
        std::fs::write(self.dir.path().join(file_name), content)?;
        Ok(self)
    }

    /// Load configuration and tests and run them like the CLI does
    pub async fn run(&self) -> Result<SuiteResult> {
        let config_path = CitrusConfig::discover(self.path())
            .ok_or_else(|| anyhow::anyhow!("No citrus.yaml in {}", self.path().display()))?;
        let mut config = CitrusConfig::load(config_path)?;
        config.settings.report_directory = self.report_dir();

        let tests = load_tests(self.path())?;
        let runner = TestRunner::from_config(&config)?.with_default_reporters();
        Ok(runner.run_suite(&tests).await?)
    }
}

/// Find a free local port for server endpoints
pub fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Panic with the collected errors when a suite failed
pub fn assert_suite_success(suite: &SuiteResult) {
    let failures: Vec<String> = suite
        .results
        .iter()
        .filter(|result| !result.is_success())
        .map(|result| format!("{}: {}", result.name, result.error.clone().unwrap_or_default()))
        .collect();
    assert!(failures.is_empty(), "Failed tests: {:?}", failures);
}
