//! Kubernetes client reference and resource commands.

pub mod actions;

use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{CitrusError, CitrusResult};
use crate::settings::env_or;

pub use actions::{KubernetesAction, KubernetesCommand, ResourceKind};

// Default configuration values
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_MAX_ATTEMPTS: usize = 150;
const DEFAULT_DELAY_BETWEEN_ATTEMPTS_MS: u64 = 2000;
const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_TEST_ID_LABEL: &str = "citrusframework.org/test-id";
const DEFAULT_LABELS: &str = "app=citrus";
const DEFAULT_WATCH_LOGS_TIMEOUT_MS: u64 = 60000;

/// Settings for Kubernetes commands, read from `CITRUS_KUBERNETES_*`
/// environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSettings {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Attempts of polling commands (verify pod, verify custom resource)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_delay_between_attempts")]
    pub delay_between_attempts: u64,
    #[serde(default = "default_service_timeout")]
    pub service_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Label carrying the test id on created resources
    #[serde(default = "default_test_id_label")]
    pub test_id_label: String,
    /// Labels added to created resources, `key=value` pairs separated by `,`
    #[serde(default = "default_labels")]
    pub default_labels: String,
    #[serde(default = "default_print_pod_logs")]
    pub print_pod_logs: bool,
    #[serde(default = "default_watch_logs_timeout")]
    pub watch_logs_timeout: u64,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_attempts: default_max_attempts(),
            delay_between_attempts: default_delay_between_attempts(),
            service_timeout: default_service_timeout(),
            connect_timeout: default_connect_timeout(),
            test_id_label: default_test_id_label(),
            default_labels: default_labels(),
            print_pod_logs: default_print_pod_logs(),
            watch_logs_timeout: default_watch_logs_timeout(),
        }
    }
}

impl KubernetesSettings {
    /// Default labels as map
    pub fn default_label_map(&self) -> BTreeMap<String, String> {
        parse_labels(&self.default_labels)
    }
}

fn default_namespace() -> String {
    std::env::var("CITRUS_KUBERNETES_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string())
}

fn default_max_attempts() -> usize {
    env_or("CITRUS_KUBERNETES_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)
}

fn default_delay_between_attempts() -> u64 {
    env_or("CITRUS_KUBERNETES_DELAY_BETWEEN_ATTEMPTS", DEFAULT_DELAY_BETWEEN_ATTEMPTS_MS)
}

fn default_service_timeout() -> u64 {
    env_or("CITRUS_KUBERNETES_SERVICE_TIMEOUT", DEFAULT_SERVICE_TIMEOUT_MS)
}

fn default_connect_timeout() -> u64 {
    env_or("CITRUS_KUBERNETES_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT_MS)
}

fn default_test_id_label() -> String {
    std::env::var("CITRUS_KUBERNETES_TEST_ID_LABEL").unwrap_or_else(|_| DEFAULT_TEST_ID_LABEL.to_string())
}

fn default_labels() -> String {
    std::env::var("CITRUS_KUBERNETES_DEFAULT_LABELS").unwrap_or_else(|_| DEFAULT_LABELS.to_string())
}

fn default_print_pod_logs() -> bool {
    env_or("CITRUS_KUBERNETES_PRINT_POD_LOGS", true)
}

fn default_watch_logs_timeout() -> u64 {
    env_or("CITRUS_KUBERNETES_WATCH_LOGS_TIMEOUT", DEFAULT_WATCH_LOGS_TIMEOUT_MS)
}

/// Parse `a=1,b=2` label expressions
pub fn parse_labels(expression: &str) -> BTreeMap<String, String> {
    expression
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Turn a test name into a valid label value: lower case alphanumerics and
/// `-`, at most 63 characters
pub fn sanitize_label_value(value: &str) -> String {
    let mut sanitized: String = value
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    sanitized.truncate(63);
    sanitized.trim_matches('-').to_string()
}

/// Split a multi document YAML manifest into objects
pub fn parse_manifest(content: &str) -> CitrusResult<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value)?;
        if object.types.is_none() {
            return Err(CitrusError::parse(
                "Kubernetes manifest",
                "resource is missing 'apiVersion' and 'kind'",
            ));
        }
        objects.push(object);
    }
    Ok(objects)
}

/// Whether a resource status holds the condition with status `True`
pub fn has_condition(resource: &serde_json::Value, condition: &str) -> bool {
    resource
        .pointer("/status/conditions")
        .and_then(|conditions| conditions.as_array())
        .map(|conditions| {
            conditions.iter().any(|entry| {
                entry.get("type").and_then(|t| t.as_str()) == Some(condition)
                    && entry
                        .get("status")
                        .map(|status| match status {
                            serde_json::Value::Bool(value) => *value,
                            other => other.as_str().map(|s| s.eq_ignore_ascii_case("true")).unwrap_or(false),
                        })
                        .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Configuration of a Kubernetes client reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesClientConfig {
    pub name: String,
    /// Namespace of all commands, falls back to the settings namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub settings: KubernetesSettings,
}

impl KubernetesClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            settings: KubernetesSettings::default(),
        }
    }
}

/// Shared Kubernetes client; connects on first use with the inferred
/// kubeconfig or in-cluster configuration
pub struct KubernetesClient {
    config: KubernetesClientConfig,
    client: OnceCell<kube::Client>,
}

impl KubernetesClient {
    pub fn new(config: KubernetesClientConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Use an existing client
    pub fn with_client(config: KubernetesClientConfig, client: kube::Client) -> Self {
        Self {
            config,
            client: OnceCell::from(client),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn settings(&self) -> &KubernetesSettings {
        &self.config.settings
    }

    /// Namespace of the client configuration or settings
    pub fn namespace(&self) -> &str {
        self.config
            .namespace
            .as_deref()
            .unwrap_or(&self.config.settings.namespace)
    }

    pub async fn client(&self) -> CitrusResult<kube::Client> {
        let client = self
            .client
            .get_or_try_init(|| async {
                debug!(client = %self.config.name, "Connecting to Kubernetes");
                let mut config = kube::Config::infer()
                    .await
                    .map_err(|e| CitrusError::runtime(format!("Failed to load Kubernetes configuration: {}", e)))?;
                config.connect_timeout = Some(Duration::from_millis(self.config.settings.connect_timeout));
                let client = kube::Client::try_from(config)?;
                info!(client = %self.config.name, "Kubernetes client connected");
                Ok::<_, CitrusError>(client)
            })
            .await?;
        Ok(client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = KubernetesSettings::default();
        assert_eq!(settings.test_id_label, "citrusframework.org/test-id");
        assert_eq!(settings.max_attempts, 150);
        assert_eq!(
            settings.default_label_map().get("app").map(String::as_str),
            Some("citrus")
        );
    }

    #[test]
    fn test_sanitize_label_value() {
        assert_eq!(sanitize_label_value("Order Flow_IT"), "order-flow-it");
        assert_eq!(sanitize_label_value(&"x".repeat(80)).len(), 63);
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: test
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: hello
"#;
        let objects = parse_manifest(manifest).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Deployment");
        assert_eq!(objects[0].metadata.name.as_deref(), Some("settings"));

        assert!(parse_manifest("metadata:\n  name: broken\n").is_err());
    }

    #[test]
    fn test_has_condition() {
        let resource = serde_json::json!({
            "status": {"conditions": [
                {"type": "Ready", "status": "True"},
                {"type": "Synced", "status": "False"}
            ]}
        });
        assert!(has_condition(&resource, "Ready"));
        assert!(!has_condition(&resource, "Synced"));
        assert!(!has_condition(&serde_json::json!({}), "Ready"));
    }
}
