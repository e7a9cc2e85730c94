//! Endpoints: the connections a test talks to.
//!
//! Every endpoint exposes the same send/receive contract. Clients store the
//! responses they get so that a later `receive` picks them up; servers turn
//! inbound requests into messages and reply with the next message sent.

pub mod base;
pub mod direct;
pub mod http;
pub mod mail;
pub mod server;
pub mod ssh;
pub mod websocket;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::context::{ReferenceRegistry, TestContext};
use crate::error::{CitrusError, CitrusResult};
use crate::kubernetes::{KubernetesClient, KubernetesClientConfig};
use crate::message::{Message, MessageSelector};
use crate::selenium::{SeleniumBrowser, SeleniumBrowserConfig};
use crate::sql::{DataSource, DataSourceConfig};

pub use base::BaseEndpoint;
pub use direct::{DirectEndpoint, DirectEndpointConfig};

/// Prefix of endpoint names that create in-memory endpoints on demand
pub const DIRECT_ENDPOINT_PREFIX: &str = "direct:";

/// A connection to a system under test
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Short type name used in logs and docs
    fn endpoint_type(&self) -> &'static str;

    /// Default timeout for receive operations
    fn timeout(&self) -> Duration;

    /// Whether the endpoint is started before the first test runs
    fn auto_start(&self) -> bool {
        false
    }

    async fn start(&self) -> CitrusResult<()> {
        Ok(())
    }

    async fn stop(&self) -> CitrusResult<()> {
        Ok(())
    }

    fn is_running(&self) -> bool {
        true
    }

    /// Send a message (or a reply, for server endpoints)
    async fn send(&self, message: Message, context: &TestContext) -> CitrusResult<()>;

    /// Receive the next message matching the selector
    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        context: &TestContext,
    ) -> CitrusResult<Message>;

    /// Discard pending messages, returns how many were removed
    async fn purge(&self, _selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(0)
    }
}

/// Registry of named endpoints
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<String, Arc<dyn Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: Arc<dyn Endpoint>) {
        info!(endpoint = %endpoint.name(), endpoint_type = endpoint.endpoint_type(), "Registering endpoint");
        self.endpoints.insert(endpoint.name().to_string(), endpoint);
    }

    /// Look up an endpoint; `direct:<name>` creates an in-memory endpoint on first use
    pub fn get(&self, name: &str) -> CitrusResult<Arc<dyn Endpoint>> {
        if let Some(endpoint) = self.endpoints.get(name) {
            return Ok(Arc::clone(endpoint.value()));
        }

        if let Some(queue) = name.strip_prefix(DIRECT_ENDPOINT_PREFIX) {
            let endpoint = self
                .endpoints
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!(endpoint = %name, "Creating dynamic direct endpoint");
                    let endpoint: Arc<dyn Endpoint> =
                        Arc::new(DirectEndpoint::new(DirectEndpointConfig::new(queue)));
                    endpoint
                })
                .value()
                .clone();
            return Ok(endpoint);
        }

        Err(CitrusError::EndpointNotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.remove(name).map(|(_, endpoint)| endpoint)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn all(&self) -> Vec<Arc<dyn Endpoint>> {
        self.endpoints.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Start all endpoints that are configured to start automatically
    pub async fn start_auto_start(&self) -> CitrusResult<()> {
        for endpoint in self.all().into_iter().filter(|e| e.auto_start() && !e.is_running()) {
            info!(endpoint = %endpoint.name(), "Auto starting endpoint");
            endpoint.start().await?;
        }
        Ok(())
    }

    /// Stop all running endpoints, errors are logged
    pub async fn stop_all(&self) {
        for endpoint in self.all().into_iter().filter(|e| e.is_running()) {
            if let Err(e) = endpoint.stop().await {
                error!(endpoint = %endpoint.name(), error = %e, "Failed to stop endpoint");
            }
        }
    }
}

/// Endpoint and client components declared in configuration files
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EndpointDefinition {
    Direct(DirectEndpointConfig),
    HttpClient(http::HttpClientConfig),
    HttpServer(http::HttpServerConfig),
    WebsocketClient(websocket::WebSocketClientConfig),
    Ssh(ssh::SshClientConfig),
    MailServer(mail::MailServerConfig),
    MailClient(mail::MailClientConfig),
    SeleniumBrowser(SeleniumBrowserConfig),
    Kubernetes(KubernetesClientConfig),
    DataSource(DataSourceConfig),
}

impl EndpointDefinition {
    pub fn name(&self) -> &str {
        match self {
            EndpointDefinition::Direct(config) => &config.name,
            EndpointDefinition::HttpClient(config) => &config.name,
            EndpointDefinition::HttpServer(config) => &config.name,
            EndpointDefinition::WebsocketClient(config) => &config.name,
            EndpointDefinition::Ssh(config) => &config.name,
            EndpointDefinition::MailServer(config) => &config.name,
            EndpointDefinition::MailClient(config) => &config.name,
            EndpointDefinition::SeleniumBrowser(config) => &config.name,
            EndpointDefinition::Kubernetes(config) => &config.name,
            EndpointDefinition::DataSource(config) => &config.name,
        }
    }

    /// Create the component and register it as endpoint and/or reference
    pub fn create(
        &self,
        endpoints: &EndpointRegistry,
        references: &ReferenceRegistry,
    ) -> CitrusResult<()> {
        debug!(component = %self.name(), "Creating component from definition");
        match self {
            EndpointDefinition::Direct(config) => {
                endpoints.register(Arc::new(DirectEndpoint::new(config.clone())));
            }
            EndpointDefinition::HttpClient(config) => {
                endpoints.register(Arc::new(http::HttpClientEndpoint::new(config.clone())?));
            }
            EndpointDefinition::HttpServer(config) => {
                endpoints.register(Arc::new(http::HttpServerEndpoint::new(config.clone())));
            }
            EndpointDefinition::WebsocketClient(config) => {
                endpoints.register(Arc::new(websocket::WebSocketClientEndpoint::new(config.clone())));
            }
            EndpointDefinition::Ssh(config) => {
                endpoints.register(Arc::new(ssh::SshClient::new(config.clone())?));
            }
            EndpointDefinition::MailServer(config) => {
                endpoints.register(Arc::new(mail::MailServer::new(config.clone())));
            }
            EndpointDefinition::MailClient(config) => {
                endpoints.register(Arc::new(mail::MailClient::new(config.clone())));
            }
            EndpointDefinition::SeleniumBrowser(config) => {
                let browser = Arc::new(SeleniumBrowser::new(config.clone())?);
                references.bind(config.name.clone(), Arc::clone(&browser));
                endpoints.register(browser);
            }
            EndpointDefinition::Kubernetes(config) => {
                references.bind(config.name.clone(), Arc::new(KubernetesClient::new(config.clone())));
            }
            EndpointDefinition::DataSource(config) => {
                references.bind(config.name.clone(), Arc::new(DataSource::open(config.clone())?));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dynamic_direct_endpoint() {
        let registry = EndpointRegistry::new();
        let first = registry.get("direct:orders").unwrap();
        let second = registry.get("direct:orders").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.endpoint_type(), "direct");
        assert!(matches!(
            registry.get("unknown"),
            Err(CitrusError::EndpointNotFound { .. })
        ));
    }

    #[test]
    fn test_definitions_from_yaml() {
        let yaml = r#"
- type: direct
  name: helloQueue
- type: httpClient
  name: todoClient
  requestUrl: http://localhost:8080
- type: dataSource
  name: todoDb
  url: ":memory:"
"#;
        let definitions: Vec<EndpointDefinition> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definitions.len(), 3);
        assert_eq!(definitions[1].name(), "todoClient");

        let endpoints = EndpointRegistry::new();
        let references = ReferenceRegistry::new();
        for definition in &definitions {
            definition.create(&endpoints, &references).unwrap();
        }
        assert_eq!(endpoints.names(), vec!["helloQueue".to_string(), "todoClient".to_string()]);
        assert!(references.contains("todoDb"));
    }
}
