use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::discovery::{self, Scope};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{has_condition, parse_manifest, sanitize_label_value, KubernetesClient};
use crate::actions::TestAction;
use crate::common::{retry, RetryPolicy};
use crate::context::{TestContext, TEST_NAME_VARIABLE};
use crate::error::{CitrusError, CitrusResult};

/// Resource types labels and annotations can be added to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    Secret,
    ConfigMap,
}

impl ResourceKind {
    fn api_resource(self) -> ApiResource {
        match self {
            ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
            ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ResourceKind::Service => ApiResource::erase::<Service>(&()),
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        }
    }
}

/// Selects a resource by name or by `key=value` label expression
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResourceSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ResourceSelector {
    fn resolve(&self, context: &TestContext) -> CitrusResult<ResourceSelector> {
        let resolve = |value: &Option<String>| -> CitrusResult<Option<String>> {
            value
                .as_ref()
                .filter(|value| !value.is_empty())
                .map(|value| context.replace_dynamic_content(value))
                .transpose()
        };
        let selector = ResourceSelector {
            name: resolve(&self.name)?,
            label: resolve(&self.label)?,
        };
        if selector.name.is_none() && selector.label.is_none() {
            return Err(CitrusError::config_invalid("kubernetes", "either resource name or label is required"));
        }
        Ok(selector)
    }
}

impl std::fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, &self.label) {
            (Some(name), _) => write!(f, "{}", name),
            (None, Some(label)) => write!(f, "{}", label),
            (None, None) => write!(f, "<none>"),
        }
    }
}

/// Manifest given inline or as file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ManifestSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ManifestSource {
    fn load(&self, context: &TestContext) -> CitrusResult<Vec<DynamicObject>> {
        let content = match (&self.content, &self.resource) {
            (Some(content), _) => content.clone(),
            (None, Some(resource)) => {
                let path = context.replace_dynamic_content(resource)?;
                std::fs::read_to_string(&path)
                    .map_err(|e| CitrusError::runtime(format!("Failed to read Kubernetes manifest '{}': {}", path, e)))?
            }
            (None, None) => return Err(CitrusError::config_invalid("kubernetes", "manifest content or resource is required")),
        };
        parse_manifest(&context.replace_dynamic_content(&content)?)
    }
}

fn default_port() -> i32 {
    80
}

fn default_protocol() -> String {
    "TCP".to_string()
}

fn default_phase() -> String {
    "Running".to_string()
}

/// Kubernetes operation of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum KubernetesCommand {
    CreateResource(ManifestSource),
    DeleteResource(ManifestSource),
    CreateSecret {
        name: String,
        #[serde(default)]
        data: BTreeMap<String, String>,
    },
    DeleteSecret {
        name: String,
    },
    CreateConfigMap {
        name: String,
        #[serde(default)]
        data: BTreeMap<String, String>,
    },
    DeleteConfigMap {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateService {
        name: String,
        #[serde(default = "default_port")]
        port: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_port: Option<i32>,
        #[serde(default = "default_protocol")]
        protocol: String,
        /// Pod selector, defaults to `app=<name>`
        #[serde(default)]
        selector: BTreeMap<String, String>,
    },
    DeleteService {
        name: String,
    },
    AddLabels {
        kind: ResourceKind,
        name: String,
        labels: BTreeMap<String, String>,
    },
    AddAnnotations {
        kind: ResourceKind,
        name: String,
        annotations: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    VerifyPod {
        #[serde(flatten)]
        selector: ResourceSelector,
        #[serde(default = "default_phase")]
        phase: String,
        /// Also require the `Ready` condition
        #[serde(default)]
        ready: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_attempts: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_between_attempts: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    WatchPodLogs {
        #[serde(flatten)]
        selector: ResourceSelector,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    VerifyCustomResource {
        #[serde(flatten)]
        selector: ResourceSelector,
        /// Plural resource type, e.g. `foos`
        #[serde(rename = "type")]
        resource_type: String,
        group: String,
        version: String,
        kind: String,
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_attempts: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_between_attempts: Option<u64>,
    },
}

impl KubernetesCommand {
    fn name(&self) -> &'static str {
        match self {
            KubernetesCommand::CreateResource(_) => "create-resource",
            KubernetesCommand::DeleteResource(_) => "delete-resource",
            KubernetesCommand::CreateSecret { .. } => "create-secret",
            KubernetesCommand::DeleteSecret { .. } => "delete-secret",
            KubernetesCommand::CreateConfigMap { .. } => "create-config-map",
            KubernetesCommand::DeleteConfigMap { .. } => "delete-config-map",
            KubernetesCommand::CreateService { .. } => "create-service",
            KubernetesCommand::DeleteService { .. } => "delete-service",
            KubernetesCommand::AddLabels { .. } => "add-labels",
            KubernetesCommand::AddAnnotations { .. } => "add-annotations",
            KubernetesCommand::VerifyPod { .. } => "verify-pod",
            KubernetesCommand::WatchPodLogs { .. } => "watch-pod-logs",
            KubernetesCommand::VerifyCustomResource { .. } => "verify-custom-resource",
        }
    }
}

/// Runs a Kubernetes command with a client reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KubernetesAction {
    /// Client reference, may be omitted when only one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub command: KubernetesCommand,
}

/// Everything a command needs while it runs
struct CommandContext<'a> {
    client: kube::Client,
    kubernetes: Arc<KubernetesClient>,
    namespace: String,
    context: &'a TestContext,
}

impl CommandContext<'_> {
    /// Default labels plus the test id label
    fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.kubernetes.settings().default_label_map();
        if let Ok(test_name) = self.context.get_variable(TEST_NAME_VARIABLE) {
            let value = sanitize_label_value(&test_name);
            if !value.is_empty() {
                labels.insert(self.kubernetes.settings().test_id_label.clone(), value);
            }
        }
        labels
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    fn resolve(&self, value: &str) -> CitrusResult<String> {
        self.context.replace_dynamic_content(value)
    }

    fn resolve_map(&self, map: &BTreeMap<String, String>) -> CitrusResult<BTreeMap<String, String>> {
        self.context.resolve_map(map)
    }

    fn polling(&self, max_attempts: Option<usize>, delay: Option<u64>) -> RetryPolicy {
        let settings = self.kubernetes.settings();
        RetryPolicy::new(
            max_attempts.unwrap_or(settings.max_attempts),
            Duration::from_millis(delay.unwrap_or(settings.delay_between_attempts)),
        )
    }

    async fn dynamic_api(&self, object: &DynamicObject) -> CitrusResult<Api<DynamicObject>> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| CitrusError::parse("Kubernetes manifest", "resource is missing 'apiVersion' and 'kind'"))?;
        let gvk = GroupVersionKind::try_from(types)
            .map_err(|e| CitrusError::parse("Kubernetes manifest", e))?;
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk).await?;

        Ok(if capabilities.scope == Scope::Namespaced {
            let namespace = object.metadata.namespace.as_deref().unwrap_or(&self.namespace);
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        })
    }

    async fn create_resources(&self, source: &ManifestSource) -> CitrusResult<()> {
        for mut object in source.load(self.context)? {
            let api = self.dynamic_api(&object).await?;
            object.labels_mut().extend(self.labels());
            let created = api.create(&PostParams::default(), &object).await?;
            info!(resource = %created.name_any(), namespace = %self.namespace, "Created Kubernetes resource");
        }
        Ok(())
    }

    async fn delete_resources(&self, source: &ManifestSource) -> CitrusResult<()> {
        for object in source.load(self.context)? {
            let api = self.dynamic_api(&object).await?;
            let name = object.name_any();
            api.delete(&name, &DeleteParams::default()).await?;
            info!(resource = %name, "Deleted Kubernetes resource");
        }
        Ok(())
    }

    async fn create_secret(&self, name: &str, data: &BTreeMap<String, String>) -> CitrusResult<()> {
        let secret = Secret {
            metadata: self.metadata(name),
            string_data: Some(self.resolve_map(data)?),
            ..Default::default()
        };
        Api::<Secret>::namespaced(self.client.clone(), &self.namespace)
            .create(&PostParams::default(), &secret)
            .await?;
        info!(secret = %name, "Created Kubernetes secret");
        Ok(())
    }

    async fn create_config_map(&self, name: &str, data: &BTreeMap<String, String>) -> CitrusResult<()> {
        let config_map = ConfigMap {
            metadata: self.metadata(name),
            data: Some(self.resolve_map(data)?),
            ..Default::default()
        };
        Api::<ConfigMap>::namespaced(self.client.clone(), &self.namespace)
            .create(&PostParams::default(), &config_map)
            .await?;
        info!(config_map = %name, "Created Kubernetes config map");
        Ok(())
    }

    async fn create_service(
        &self,
        name: &str,
        port: i32,
        target_port: Option<i32>,
        protocol: &str,
        selector: &BTreeMap<String, String>,
    ) -> CitrusResult<()> {
        let service = build_service(self.metadata(name), name, port, target_port, protocol, self.resolve_map(selector)?);
        Api::<Service>::namespaced(self.client.clone(), &self.namespace)
            .create(&PostParams::default(), &service)
            .await?;
        info!(service = %name, port, "Created Kubernetes service");
        Ok(())
    }

    async fn patch_metadata(&self, kind: ResourceKind, name: &str, field: &str, values: &BTreeMap<String, String>) -> CitrusResult<()> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, &kind.api_resource());
        let patch = serde_json::json!({ "metadata": { field: self.resolve_map(values)? } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        info!(resource = %name, ?kind, field, "Patched Kubernetes resource metadata");
        Ok(())
    }

    async fn find_pod(&self, selector: &ResourceSelector) -> CitrusResult<Option<Pod>> {
        let pods = Api::<Pod>::namespaced(self.client.clone(), &self.namespace);
        match (&selector.name, &selector.label) {
            (Some(name), _) => Ok(pods.get_opt(name).await?),
            (None, Some(label)) => Ok(pods.list(&ListParams::default().labels(label)).await?.items.into_iter().next()),
            (None, None) => Ok(None),
        }
    }

    async fn verify_pod(&self, selector: &ResourceSelector, phase: &str, ready: bool, policy: RetryPolicy) -> CitrusResult<()> {
        retry(policy, "Verify pod", |_| async move {
            let pod = self
                .find_pod(selector)
                .await?
                .ok_or_else(|| CitrusError::runtime(format!("Pod '{}' not found", selector)))?;
            check_pod(&pod, phase, ready)
        })
        .await
        .map_err(|e| {
            CitrusError::runtime(format!(
                "Failed to verify pod '{}' - is not in state '{}' after {} attempts: {}",
                selector, phase, policy.max_attempts, e
            ))
        })?;
        info!("Verified pod '{}' state '{}'", selector, phase);
        Ok(())
    }

    async fn watch_pod_logs(&self, selector: &ResourceSelector, message: &str, timeout: Duration) -> CitrusResult<()> {
        let pods = Api::<Pod>::namespaced(self.client.clone(), &self.namespace);
        let interval = Duration::from_millis(self.kubernetes.settings().delay_between_attempts.min(1000));
        let policy = RetryPolicy::for_timeout(timeout, interval);

        let logs = retry(policy, "Watch pod logs", |_| {
            let pods = pods.clone();
            async move {
                let pod = self
                    .find_pod(selector)
                    .await?
                    .ok_or_else(|| CitrusError::runtime(format!("Pod '{}' not found", selector)))?;
                let logs = pods.logs(&pod.name_any(), &LogParams::default()).await?;
                if logs.contains(message) {
                    Ok(logs)
                } else {
                    Err(CitrusError::runtime(format!("Pod log does not contain '{}' yet", message)))
                }
            }
        })
        .await
        .map_err(|e| {
            CitrusError::runtime(format!(
                "Failed to watch logs of pod '{}' within {} ms: {}",
                selector,
                timeout.as_millis(),
                e
            ))
        })?;

        if self.kubernetes.settings().print_pod_logs {
            info!("Pod '{}' logs:\n{}", selector, logs);
        }
        info!("Verified pod '{}' logs contain '{}'", selector, message);
        Ok(())
    }

    async fn verify_custom_resource(
        &self,
        selector: &ResourceSelector,
        resource: &ApiResource,
        condition: &str,
        policy: RetryPolicy,
    ) -> CitrusResult<()> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, resource);
        retry(policy, "Verify custom resource", |_| {
            let api = api.clone();
            async move {
                let candidates = match (&selector.name, &selector.label) {
                    (Some(name), _) => api.get_opt(name).await?.into_iter().collect(),
                    (None, Some(label)) => api.list(&ListParams::default().labels(label)).await?.items,
                    (None, None) => Vec::new(),
                };
                let verified = candidates
                    .iter()
                    .filter_map(|object| serde_json::to_value(object).ok())
                    .any(|value| has_condition(&value, condition));
                if verified {
                    Ok(())
                } else {
                    Err(CitrusError::runtime(format!("Resource '{}' has no condition '{}'", selector, condition)))
                }
            }
        })
        .await
        .map_err(|e| {
            CitrusError::runtime(format!(
                "Failed to verify resource '{}' - is not in state '{}' after {} attempts: {}",
                selector, condition, policy.max_attempts, e
            ))
        })?;
        info!("Verified resource '{}' state '{}'", selector, condition);
        Ok(())
    }

    async fn delete<K>(&self, name: &str) -> CitrusResult<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + std::fmt::Debug
            + serde::de::DeserializeOwned,
    {
        Api::<K>::namespaced(self.client.clone(), &self.namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        info!(resource = %name, kind = %K::kind(&()), "Deleted Kubernetes resource");
        Ok(())
    }
}

/// Service selecting pods by `selector`, or `app=<name>` when empty
fn build_service(
    metadata: ObjectMeta,
    name: &str,
    port: i32,
    target_port: Option<i32>,
    protocol: &str,
    mut selector: BTreeMap<String, String>,
) -> Service {
    if selector.is_empty() {
        selector.insert("app".to_string(), name.to_string());
    }
    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some(format!("{}-{}", protocol.to_ascii_lowercase(), port)),
                port,
                target_port: Some(IntOrString::Int(target_port.unwrap_or(port))),
                protocol: Some(protocol.to_ascii_uppercase()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod phase must match; with `ready` the `Ready` condition must be true
fn check_pod(pod: &Pod, phase: &str, ready: bool) -> CitrusResult<()> {
    let status = pod.status.as_ref();
    let actual = status.and_then(|status| status.phase.as_deref()).unwrap_or("Unknown");
    if !actual.eq_ignore_ascii_case(phase) {
        return Err(CitrusError::runtime(format!("Pod is in phase '{}'", actual)));
    }

    if ready {
        let is_ready = status
            .and_then(|status| status.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|condition| condition.type_ == "Ready" && condition.status == "True")
            })
            .unwrap_or(false);
        if !is_ready {
            return Err(CitrusError::runtime("Pod is not ready"));
        }
    }
    Ok(())
}

#[async_trait]
impl TestAction for KubernetesAction {
    fn name(&self) -> &str {
        self.command.name()
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let client_name = match &self.client {
            Some(name) => Some(context.replace_dynamic_content(name)?),
            None => None,
        };
        let kubernetes = context
            .references()
            .resolve_optional_name::<KubernetesClient>(client_name.as_deref())?;
        let namespace = match &self.namespace {
            Some(namespace) => context.replace_dynamic_content(namespace)?,
            None => kubernetes.namespace().to_string(),
        };
        debug!(command = self.command.name(), namespace = %namespace, "Executing Kubernetes command");

        let command = CommandContext {
            client: kubernetes.client().await?,
            kubernetes,
            namespace,
            context,
        };

        match &self.command {
            KubernetesCommand::CreateResource(source) => command.create_resources(source).await,
            KubernetesCommand::DeleteResource(source) => command.delete_resources(source).await,
            KubernetesCommand::CreateSecret { name, data } => command.create_secret(&command.resolve(name)?, data).await,
            KubernetesCommand::DeleteSecret { name } => command.delete::<Secret>(&command.resolve(name)?).await,
            KubernetesCommand::CreateConfigMap { name, data } => {
                command.create_config_map(&command.resolve(name)?, data).await
            }
            KubernetesCommand::DeleteConfigMap { name } => command.delete::<ConfigMap>(&command.resolve(name)?).await,
            KubernetesCommand::CreateService {
                name,
                port,
                target_port,
                protocol,
                selector,
            } => {
                command
                    .create_service(&command.resolve(name)?, *port, *target_port, protocol, selector)
                    .await
            }
            KubernetesCommand::DeleteService { name } => command.delete::<Service>(&command.resolve(name)?).await,
            KubernetesCommand::AddLabels { kind, name, labels } => {
                command.patch_metadata(*kind, &command.resolve(name)?, "labels", labels).await
            }
            KubernetesCommand::AddAnnotations { kind, name, annotations } => {
                command
                    .patch_metadata(*kind, &command.resolve(name)?, "annotations", annotations)
                    .await
            }
            KubernetesCommand::VerifyPod {
                selector,
                phase,
                ready,
                max_attempts,
                delay_between_attempts,
            } => {
                let policy = command.polling(*max_attempts, *delay_between_attempts);
                command
                    .verify_pod(&selector.resolve(context)?, &command.resolve(phase)?, *ready, policy)
                    .await
            }
            KubernetesCommand::WatchPodLogs {
                selector,
                message,
                timeout,
            } => {
                let timeout = Duration::from_millis(timeout.unwrap_or(command.kubernetes.settings().watch_logs_timeout));
                command
                    .watch_pod_logs(&selector.resolve(context)?, &command.resolve(message)?, timeout)
                    .await
            }
            KubernetesCommand::VerifyCustomResource {
                selector,
                resource_type,
                group,
                version,
                kind,
                condition,
                max_attempts,
                delay_between_attempts,
            } => {
                let gvk = GroupVersionKind::gvk(&command.resolve(group)?, &command.resolve(version)?, &command.resolve(kind)?);
                let resource = ApiResource::from_gvk_with_plural(&gvk, &command.resolve(resource_type)?);
                let policy = command.polling(*max_attempts, *delay_between_attempts);
                command
                    .verify_custom_resource(&selector.resolve(context)?, &resource, &command.resolve(condition)?, policy)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};

    #[test]
    fn test_action_from_yaml() {
        let action: KubernetesAction = serde_yaml::from_str(
            r#"
client: k8s
verifyPod:
  label: app=hello
  ready: true
  maxAttempts: 5
"#,
        )
        .unwrap();
        assert_eq!(action.client.as_deref(), Some("k8s"));
        match action.command {
            KubernetesCommand::VerifyPod {
                selector,
                phase,
                ready,
                max_attempts,
                ..
            } => {
                assert_eq!(selector.label.as_deref(), Some("app=hello"));
                assert_eq!(phase, "Running");
                assert!(ready);
                assert_eq!(max_attempts, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let action: KubernetesAction =
            serde_yaml::from_str("addLabels:\n  kind: configMap\n  name: settings\n  labels:\n    tier: test\n").unwrap();
        assert_eq!(action.name(), "add-labels");
    }

    #[test]
    fn test_selector_requires_name_or_label() {
        let context = TestContext::new();
        context.set_variable("pod", "hello-1").unwrap();
        let selector = ResourceSelector {
            name: Some("${pod}".to_string()),
            label: None,
        };
        assert_eq!(selector.resolve(&context).unwrap().to_string(), "hello-1");
        assert!(ResourceSelector::default().resolve(&context).is_err());
    }

    #[test]
    fn test_build_service() {
        let service = build_service(ObjectMeta::default(), "hello", 8080, None, "tcp", BTreeMap::new());
        let spec = service.spec.unwrap();
        assert_eq!(spec.selector.unwrap().get("app").map(String::as_str), Some("hello"));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
    }

    #[test]
    fn test_check_pod() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(check_pod(&pod, "Running", false).is_ok());
        assert!(check_pod(&pod, "running", true).is_err());
        assert!(check_pod(&pod, "Succeeded", false).is_err());
    }
}
