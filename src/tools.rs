//! Tooling: JSON schemas, Markdown docs and test skeletons.

use serde_json::Value;
use std::fmt::Write;
use tracing::debug;

use crate::actions::EchoAction;
use crate::dsl::{ActionDefinition, ACTION_CATALOGUE};
use crate::error::{CitrusError, CitrusResult};
use crate::functions::FunctionRegistry;
use crate::settings::{CitrusConfig, FUNCTION_PREFIX};
use crate::testcase::TestCase;
use crate::validation::matcher::ValidationMatcherRegistry;
use crate::validation::MessageValidatorRegistry;

/// Endpoint `type` values of the configuration file
pub const ENDPOINT_TYPES: &[(&str, &str)] = &[
    ("direct", "In-memory message queue"),
    ("httpClient", "HTTP client sending requests to a base URL"),
    ("httpServer", "HTTP server recording requests and answering them"),
    ("websocketClient", "WebSocket client connection"),
    ("ssh", "SSH command execution through the ssh binary"),
    ("mailServer", "SMTP server receiving mails as messages"),
    ("mailClient", "SMTP client sending mail messages"),
    ("seleniumBrowser", "Browser driven through a WebDriver server"),
    ("kubernetes", "Kubernetes client used by kubernetes actions"),
    ("dataSource", "SQLite data source used by sql actions"),
];

/// Which schema to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    TestCase,
    Config,
}

impl std::str::FromStr for SchemaKind {
    type Err = CitrusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "test" | "testcase" => Ok(SchemaKind::TestCase),
            "config" => Ok(SchemaKind::Config),
            other => Err(CitrusError::config_invalid(
                "schema",
                format!("unknown schema '{}', expected 'test' or 'config'", other),
            )),
        }
    }
}

/// JSON schema of YAML tests or of the configuration file
pub fn schema(kind: SchemaKind) -> CitrusResult<Value> {
    let schema = match kind {
        SchemaKind::TestCase => schemars::schema_for!(TestCase),
        SchemaKind::Config => schemars::schema_for!(CitrusConfig),
    };
    Ok(serde_json::to_value(schema)?)
}

/// Markdown reference of actions, functions, matchers, validators and endpoint types
pub fn docs() -> String {
    let mut doc = String::from("# Citrus reference\n\n");

    doc.push_str("## Test actions\n\n| Action | Description |\n|---|---|\n");
    for (name, summary) in ACTION_CATALOGUE {
        let _ = writeln!(doc, "| `{}` | {} |", name, summary);
    }

    doc.push_str("\n## Functions\n\n");
    for name in FunctionRegistry::with_defaults().names() {
        let _ = writeln!(doc, "- `{}{}()`", FUNCTION_PREFIX, name);
    }

    doc.push_str("\n## Validation matchers\n\n");
    for name in ValidationMatcherRegistry::with_defaults().names() {
        let _ = writeln!(doc, "- `@{}()@`", name);
    }

    doc.push_str("\n## Message validators\n\n");
    for name in MessageValidatorRegistry::with_defaults().names() {
        let _ = writeln!(doc, "- {}", name);
    }

    doc.push_str("\n## Endpoint types\n\n| Type | Description |\n|---|---|\n");
    for (name, summary) in ENDPOINT_TYPES {
        let _ = writeln!(doc, "| `{}` | {} |", name, summary);
    }
    doc
}

/// YAML skeleton of a new test
pub fn create_test(name: &str, author: Option<&str>, description: Option<&str>) -> CitrusResult<String> {
    if name.trim().is_empty() {
        return Err(CitrusError::config_invalid("name", "test name must not be empty"));
    }
    debug!(test = %name, "Creating test skeleton");

    let action = ActionDefinition::Echo(EchoAction {
        message: format!("TODO: Code the test {}", name),
    });
    let test = TestCase {
        name: name.to_string(),
        author: Some(author.unwrap_or("Citrus").to_string()),
        description: Some(description.unwrap_or("Sample test in YAML").to_string()),
        variables: Vec::new(),
        actions: vec![action],
        finally: Vec::new(),
    };
    // through a JSON value so actions are written as single-key maps instead of YAML tags
    let value = serde_json::to_value(&test)?;
    Ok(serde_yaml::to_string(&value)?)
}
