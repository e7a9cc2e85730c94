use anyhow::Result;
use async_trait::async_trait;
use http::{Method, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{header_to_query, ErrorHandlingStrategy, HttpClientConfig};
use crate::context::TestContext;
use crate::endpoints::Endpoint;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message, MessageQueue, MessageSelector};

/// Outgoing HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response data of an HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
    /// Response headers, names in lower case
    headers: BTreeMap<String, String>,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status_code
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Get the body as text (consumes the response)
    pub fn text(self) -> String {
        self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Trait for HTTP client operations, allowing for mocking
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform an HTTP request
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute(HttpRequest::new(Method::GET, url)).await
    }

    async fn post(&self, url: &str, body: String) -> Result<HttpResponse> {
        self.execute(
            HttpRequest::new(Method::POST, url)
                .with_header("Content-Type", "application/json")
                .with_body(body),
        )
        .await
    }

    async fn delete(&self, url: &str) -> Result<HttpResponse> {
        self.execute(HttpRequest::new(Method::DELETE, url)).await
    }
}

/// Implementation of HttpClient using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new client with custom configuration
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method, &request.url);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let mut result = HttpResponse::new(response.status().as_u16(), String::new());
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                result = result.with_header(key.as_str(), value);
            }
        }
        result.body = response.text().await?;

        Ok(result)
    }
}

/// Client endpoint sending messages as HTTP requests.
///
/// The response of each request is kept until the test receives it.
pub struct HttpClientEndpoint {
    config: HttpClientConfig,
    client: Arc<dyn HttpClient>,
    responses: MessageQueue,
}

impl HttpClientEndpoint {
    pub fn new(config: HttpClientConfig) -> CitrusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout))
            .build()
            .map_err(|e| CitrusError::endpoint(&config.name, e))?;
        Ok(Self::with_client(config, Arc::new(ReqwestHttpClient::with_client(client))))
    }

    /// Use a custom client implementation
    pub fn with_client(config: HttpClientConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            responses: MessageQueue::new(format!("{}.responses", config.name)),
            config,
            client,
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Build the request for a message
    fn build_request(&self, message: &Message) -> CitrusResult<HttpRequest> {
        let method_name = message
            .header(headers::HTTP_METHOD)
            .unwrap_or(self.config.request_method.as_str())
            .to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| CitrusError::config_invalid("method", format!("invalid HTTP method '{}'", method_name)))?;

        let mut url = message
            .header(headers::ENDPOINT_URI)
            .unwrap_or(self.config.request_url.as_str())
            .trim_end_matches('/')
            .to_string();
        if let Some(path) = message.header(headers::HTTP_REQUEST_PATH) {
            if !path.is_empty() {
                if !path.starts_with('/') {
                    url.push('/');
                }
                url.push_str(path);
            }
        }
        if let Some(params) = message.header(headers::HTTP_QUERY_PARAMS) {
            let query = header_to_query(params);
            if !query.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
        }

        let mut request = HttpRequest::new(method.clone(), url)
            .with_timeout(Duration::from_millis(self.config.timeout));
        for (key, value) in &self.config.headers {
            request = request.with_header(key, value);
        }
        for (key, value) in message.custom_headers() {
            request = request.with_header(key, value);
        }

        let has_body = !message.payload.is_empty();
        if has_body || (method != Method::GET && method != Method::HEAD) {
            if message.header_ignore_case(headers::HTTP_CONTENT_TYPE).is_none() {
                request = request.with_header(headers::HTTP_CONTENT_TYPE, &self.config.content_type);
            }
        }
        if has_body {
            request = request.with_body(message.payload.clone());
        }

        Ok(request)
    }
}

/// Convert a response into a message with status headers
pub fn response_to_message(response: HttpResponse) -> Message {
    let status = response.status();
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default();

    let mut message = Message::new(response.body().to_string())
        .with_header(headers::HTTP_STATUS_CODE, status.to_string())
        .with_header(headers::HTTP_REASON_PHRASE, reason);
    for (key, value) in response.headers() {
        if key == "content-type" {
            message.set_header(headers::HTTP_CONTENT_TYPE, value);
        } else {
            message.set_header(key, value);
        }
    }
    message
}

#[async_trait]
impl Endpoint for HttpClientEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "http-client"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    #[instrument(skip(self, message, _context), level = "debug")]
    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        let request = self.build_request(&message)?;
        info!(method = %request.method, url = %request.url, "Sending HTTP request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| CitrusError::endpoint(&self.config.name, e))?;
        debug!(status = response.status(), "Received HTTP response");

        if self.config.error_handling == ErrorHandlingStrategy::ThrowsException
            && response.status() >= 400
        {
            return Err(CitrusError::endpoint(
                &self.config.name,
                format!("HTTP request failed with status {}: {}", response.status(), response.body()),
            ));
        }

        self.responses.push(response_to_message(response));
        Ok(())
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        self.responses
            .receive(selector, timeout)
            .await
            .ok_or_else(|| CitrusError::timeout(&self.config.name, timeout))
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.responses.purge(selector))
    }
}

/// Mock implementation of HttpClient for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A mock HTTP client that returns predefined responses
    #[derive(Default)]
    pub struct MockHttpClient {
        /// Responses by method and URL
        responses: Mutex<HashMap<(Method, String), HttpResponse>>,
        /// Record of requests made
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a mock response
        pub fn mock_response(&self, method: Method, url: impl Into<String>, status: u16, body: impl Into<String>) {
            self.responses
                .lock()
                .unwrap()
                .insert((method, url.into()), HttpResponse::new(status, body));
        }

        /// Register a JSON response
        pub fn mock_json<T: serde::Serialize>(
            &self,
            method: Method,
            url: impl Into<String>,
            status: u16,
            data: &T,
        ) -> Result<()> {
            let response = HttpResponse::new(status, serde_json::to_string(data)?)
                .with_header("content-type", "application/json");
            self.responses.lock().unwrap().insert((method, url.into()), response);
            Ok(())
        }

        /// Get the list of recorded requests
        pub fn get_requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let key = (request.method.clone(), request.url.clone());
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("No mock response configured for {} {}", key.0, key.1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockHttpClient;
    use super::*;

    fn endpoint(mock: Arc<MockHttpClient>, strategy: ErrorHandlingStrategy) -> HttpClientEndpoint {
        let mut config = HttpClientConfig::new("todoClient", "http://localhost:8080/api/");
        config.headers.insert("X-Client".to_string(), "citrus".to_string());
        config.error_handling = strategy;
        HttpClientEndpoint::with_client(config, mock)
    }

    #[tokio::test]
    async fn test_request_from_message_headers() -> Result<()> {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_json(
            Method::GET,
            "http://localhost:8080/api/todos?id=1&done=false",
            200,
            &serde_json::json!({"id": 1}),
        )?;
        let endpoint = endpoint(Arc::clone(&mock), ErrorHandlingStrategy::Propagate);
        let context = TestContext::new();

        let request = Message::empty()
            .with_header(headers::HTTP_METHOD, "get")
            .with_header(headers::HTTP_REQUEST_PATH, "todos")
            .with_header(headers::HTTP_QUERY_PARAMS, "id=1,done=false")
            .with_header("Accept", "application/json");
        endpoint.send(request, &context).await?;

        let recorded = mock.get_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].headers.get("X-Client").map(String::as_str), Some("citrus"));
        assert_eq!(recorded[0].headers.get("Accept").map(String::as_str), Some("application/json"));
        assert!(recorded[0].body.is_none());

        let response = endpoint.receive(None, Duration::from_millis(100), &context).await?;
        assert_eq!(response.header(headers::HTTP_STATUS_CODE), Some("200"));
        assert_eq!(response.header(headers::HTTP_REASON_PHRASE), Some("OK"));
        assert_eq!(response.header(headers::HTTP_CONTENT_TYPE), Some("application/json"));
        assert_eq!(response.payload, r#"{"id":1}"#);
        Ok(())
    }

    #[tokio::test]
    async fn test_post_uses_default_content_type() -> Result<()> {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_response(Method::POST, "http://localhost:8080/api", 201, "");
        let endpoint = endpoint(Arc::clone(&mock), ErrorHandlingStrategy::Propagate);

        endpoint
            .send(Message::new(r#"{"title":"write tests"}"#), &TestContext::new())
            .await?;

        let recorded = mock.get_requests();
        assert_eq!(recorded[0].method, Method::POST);
        assert_eq!(
            recorded[0].headers.get(headers::HTTP_CONTENT_TYPE).map(String::as_str),
            Some("application/json")
        );
        assert_eq!(recorded[0].body.as_deref(), Some(r#"{"title":"write tests"}"#));
        Ok(())
    }

    #[tokio::test]
    async fn test_error_handling_strategy() {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_response(Method::POST, "http://localhost:8080/api", 500, "boom");
        let context = TestContext::new();

        let propagating = endpoint(Arc::clone(&mock), ErrorHandlingStrategy::Propagate);
        assert!(propagating.send(Message::new("x"), &context).await.is_ok());
        let response = propagating
            .receive(None, Duration::from_millis(100), &context)
            .await
            .unwrap();
        assert_eq!(response.header(headers::HTTP_STATUS_CODE), Some("500"));

        let throwing = endpoint(mock, ErrorHandlingStrategy::ThrowsException);
        let err = throwing.send(Message::new("x"), &context).await.unwrap_err();
        assert!(err.to_string().contains("status 500"));
    }
}
