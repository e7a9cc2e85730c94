//! HTTP request/response actions on top of send and receive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::message::{BodyDefinition, ExtractDefinition, MessageBuilder, ReceiveMessageAction, SendMessageAction, ValidationDefinition};
use super::TestAction;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::headers;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<ValidationDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractDefinition>,
}

impl HttpRequestDefinition {
    fn message(&self) -> MessageBuilder {
        let mut headers = self.headers.clone();
        if let Some(method) = &self.method {
            headers.insert(headers::HTTP_METHOD.to_string(), method.to_ascii_uppercase());
        }
        if let Some(path) = &self.path {
            headers.insert(headers::HTTP_REQUEST_PATH.to_string(), path.clone());
        }
        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(",");
            headers.insert(headers::HTTP_QUERY_PARAMS.to_string(), query);
        }
        if let Some(content_type) = &self.content_type {
            headers.insert(headers::HTTP_CONTENT_TYPE.to_string(), content_type.clone());
        }

        MessageBuilder {
            headers,
            body: self.body.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseDefinition {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<ValidationDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractDefinition>,
}

fn default_status() -> u16 {
    200
}

impl HttpResponseDefinition {
    fn message(&self) -> MessageBuilder {
        let mut headers = self.headers.clone();
        headers.insert(headers::HTTP_STATUS_CODE.to_string(), self.status.to_string());
        if let Some(reason) = &self.reason_phrase {
            headers.insert(headers::HTTP_REASON_PHRASE.to_string(), reason.clone());
        }
        if let Some(content_type) = &self.content_type {
            headers.insert(headers::HTTP_CONTENT_TYPE.to_string(), content_type.clone());
        }

        MessageBuilder {
            headers,
            body: self.body.clone(),
            ..Default::default()
        }
    }
}

/// One side of an HTTP exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum HttpOperation {
    SendRequest(HttpRequestDefinition),
    ReceiveResponse(HttpResponseDefinition),
    ReceiveRequest(HttpRequestDefinition),
    SendResponse(HttpResponseDefinition),
}

/// HTTP client or server interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HttpAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(flatten)]
    pub operation: HttpOperation,
}

impl HttpAction {
    fn endpoint(&self) -> CitrusResult<&str> {
        match (&self.client, &self.server, &self.operation) {
            (Some(client), _, HttpOperation::SendRequest(_) | HttpOperation::ReceiveResponse(_)) => Ok(client),
            (_, Some(server), HttpOperation::ReceiveRequest(_) | HttpOperation::SendResponse(_)) => Ok(server),
            (_, _, HttpOperation::SendRequest(_) | HttpOperation::ReceiveResponse(_)) => {
                Err(CitrusError::config_invalid("http", "client requests and responses need a 'client'"))
            }
            _ => Err(CitrusError::config_invalid("http", "server requests and responses need a 'server'")),
        }
    }
}

#[async_trait]
impl TestAction for HttpAction {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let endpoint = self.endpoint()?.to_string();
        match &self.operation {
            HttpOperation::SendRequest(request) => {
                SendMessageAction::new(endpoint, request.message()).execute(context).await
            }
            HttpOperation::SendResponse(response) => {
                SendMessageAction::new(endpoint, response.message()).execute(context).await
            }
            HttpOperation::ReceiveRequest(request) => {
                ReceiveMessageAction {
                    endpoint,
                    message: request.message(),
                    timeout: request.timeout,
                    validate: request.validate.clone(),
                    extract: request.extract.clone(),
                    selector: None,
                }
                .execute(context)
                .await
            }
            HttpOperation::ReceiveResponse(response) => {
                ReceiveMessageAction {
                    endpoint,
                    message: response.message(),
                    timeout: response.timeout,
                    validate: response.validate.clone(),
                    extract: response.extract.clone(),
                    selector: None,
                }
                .execute(context)
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::http::client::mock::MockHttpClient;
    use crate::endpoints::http::{HttpClientConfig, HttpClientEndpoint};
    use http::Method;
    use std::sync::Arc;

    fn context_with_client(mock: Arc<MockHttpClient>) -> TestContext {
        let context = TestContext::new();
        let config = HttpClientConfig::new("todoClient", "http://localhost:8080");
        context
            .endpoints()
            .register(Arc::new(HttpClientEndpoint::with_client(config, mock)));
        context
    }

    #[tokio::test]
    async fn test_client_request_and_response() {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_json(Method::GET, "http://localhost:8080/todos/1", 200, &serde_json::json!({"id": 1, "title": "Learn"}))
            .unwrap();
        let context = context_with_client(Arc::clone(&mock));
        context.set_variable("todoId", "1").unwrap();

        let send: HttpAction = serde_yaml::from_str(
            "client: todoClient\nsendRequest:\n  method: get\n  path: /todos/${todoId}\n",
        )
        .unwrap();
        send.execute(&context).await.unwrap();

        let receive: HttpAction = serde_yaml::from_str(
            r#"
client: todoClient
receiveResponse:
  status: 200
  body:
    data: '{"id": "${todoId}", "title": "@ignore@"}'
  extract:
    body:
      - path: $.title
        variable: title
"#,
        )
        .unwrap();
        receive.execute(&context).await.unwrap();

        assert_eq!(context.get_variable("title").unwrap(), "Learn");
        assert_eq!(mock.get_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_status_fails() {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_response(Method::GET, "http://localhost:8080/missing", 404, "");
        let context = context_with_client(mock);

        HttpAction {
            client: Some("todoClient".to_string()),
            server: None,
            operation: HttpOperation::SendRequest(HttpRequestDefinition {
                method: Some("GET".to_string()),
                path: Some("/missing".to_string()),
                ..Default::default()
            }),
        }
        .execute(&context)
        .await
        .unwrap();

        let err = HttpAction {
            client: Some("todoClient".to_string()),
            server: None,
            operation: HttpOperation::ReceiveResponse(serde_yaml::from_str("status: 200").unwrap()),
        }
        .execute(&context)
        .await
        .unwrap_err();
        assert!(matches!(err, CitrusError::Validation(_)));
    }

    #[test]
    fn test_missing_server() {
        let action: HttpAction = serde_yaml::from_str("client: todoClient\nreceiveRequest:\n  path: /\n").unwrap();
        assert!(action.endpoint().is_err());
    }
}
