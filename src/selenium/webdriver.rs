// W3C WebDriver wire protocol over the pluggable HTTP client
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::endpoints::http::client::{HttpClient, HttpRequest};
use crate::error::{CitrusError, CitrusResult};

/// Key of element references in WebDriver responses
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735b1f2c2f";

/// Strategy and value to locate an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    pub using: &'static str,
    pub value: String,
}

impl Locator {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            using: "css selector",
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            using: "xpath",
            value: value.into(),
        }
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Self {
            using: "link text",
            value: value.into(),
        }
    }

    pub fn partial_link_text(value: impl Into<String>) -> Self {
        Self {
            using: "partial link text",
            value: value.into(),
        }
    }

    pub fn tag_name(value: impl Into<String>) -> Self {
        Self {
            using: "tag name",
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.using, self.value)
    }
}

/// Error payload of a failed command
#[derive(Debug, Deserialize)]
struct WebDriverError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Handle of an element found in the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// A WebDriver session, cheap to clone
#[derive(Clone)]
pub struct WebDriverSession {
    client: Arc<dyn HttpClient>,
    /// `<server>/session/<id>`
    base_url: String,
    session_id: String,
    timeout: Duration,
}

impl std::fmt::Debug for WebDriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverSession")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

async fn call(
    client: &dyn HttpClient,
    method: Method,
    url: String,
    body: Option<Value>,
    timeout: Duration,
) -> CitrusResult<Value> {
    trace!(%method, %url, "WebDriver command");
    let mut request = HttpRequest::new(method, url).with_timeout(timeout);
    if let Some(body) = body {
        request = request
            .with_header("Content-Type", "application/json")
            .with_body(body.to_string());
    }

    let response = client
        .execute(request)
        .await
        .map_err(|e| CitrusError::runtime(format!("WebDriver request failed: {}", e)))?;
    let status = response.status();
    let mut payload: Value = if response.body().trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(response.body())?
    };
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if !response.is_success() {
        let reason = serde_json::from_value::<WebDriverError>(value)
            .map(|e| format!("{}: {}", e.error, e.message))
            .unwrap_or_else(|_| format!("status {}", status));
        return Err(CitrusError::runtime(format!("WebDriver command failed - {}", reason)));
    }
    Ok(value)
}

/// Create a session on a WebDriver server
pub async fn new_session(
    client: Arc<dyn HttpClient>,
    server_url: &str,
    capabilities: Value,
    timeout: Duration,
) -> CitrusResult<WebDriverSession> {
    let server_url = server_url.trim_end_matches('/');
    let value = call(
        client.as_ref(),
        Method::POST,
        format!("{}/session", server_url),
        Some(json!({ "capabilities": { "alwaysMatch": capabilities } })),
        timeout,
    )
    .await?;

    let session_id = value
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| CitrusError::runtime("WebDriver did not return a session id"))?
        .to_string();
    debug!(session = %session_id, "WebDriver session created");

    Ok(WebDriverSession {
        base_url: format!("{}/session/{}", server_url, session_id),
        client,
        session_id,
        timeout,
    })
}

fn element_ref(value: &Value) -> CitrusResult<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| CitrusError::runtime("WebDriver response is not an element reference"))
}

fn element_arg(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

impl WebDriverSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> CitrusResult<Value> {
        call(
            self.client.as_ref(),
            method,
            format!("{}{}", self.base_url, path),
            body,
            self.timeout,
        )
        .await
    }

    async fn get(&self, path: &str) -> CitrusResult<Value> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> CitrusResult<Value> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get_string(&self, path: &str) -> CitrusResult<String> {
        Ok(match self.get(path).await? {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn get_bool(&self, path: &str) -> CitrusResult<bool> {
        Ok(self.get(path).await?.as_bool().unwrap_or(false))
    }

    pub async fn quit(&self) -> CitrusResult<()> {
        call(
            self.client.as_ref(),
            Method::DELETE,
            self.base_url.clone(),
            None,
            self.timeout,
        )
        .await
        .map(|_| ())
    }

    pub async fn navigate(&self, url: &str) -> CitrusResult<()> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    pub async fn current_url(&self) -> CitrusResult<String> {
        self.get_string("/url").await
    }

    pub async fn back(&self) -> CitrusResult<()> {
        self.post("/back", json!({})).await.map(|_| ())
    }

    pub async fn forward(&self) -> CitrusResult<()> {
        self.post("/forward", json!({})).await.map(|_| ())
    }

    pub async fn refresh(&self) -> CitrusResult<()> {
        self.post("/refresh", json!({})).await.map(|_| ())
    }

    pub async fn find_element(&self, locator: &Locator) -> CitrusResult<ElementRef> {
        let value = self
            .post("/element", json!({ "using": locator.using, "value": locator.value }))
            .await
            .map_err(|e| CitrusError::runtime(format!("Failed to find element '{}': {}", locator, e)))?;
        element_ref(&value)
    }

    pub async fn find_elements(&self, locator: &Locator) -> CitrusResult<Vec<ElementRef>> {
        let value = self
            .post("/elements", json!({ "using": locator.using, "value": locator.value }))
            .await?;
        value.as_array().map(|items| items.iter().map(element_ref).collect()).unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Elements below `parent`
    pub async fn find_child_elements(&self, parent: &ElementRef, locator: &Locator) -> CitrusResult<Vec<ElementRef>> {
        let value = self
            .post(
                &format!("/element/{}/elements", parent.0),
                json!({ "using": locator.using, "value": locator.value }),
            )
            .await?;
        value.as_array().map(|items| items.iter().map(element_ref).collect()).unwrap_or_else(|| Ok(Vec::new()))
    }

    pub async fn click(&self, element: &ElementRef) -> CitrusResult<()> {
        self.post(&format!("/element/{}/click", element.0), json!({})).await.map(|_| ())
    }

    pub async fn clear(&self, element: &ElementRef) -> CitrusResult<()> {
        self.post(&format!("/element/{}/clear", element.0), json!({})).await.map(|_| ())
    }

    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> CitrusResult<()> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await
            .map(|_| ())
    }

    pub async fn text(&self, element: &ElementRef) -> CitrusResult<String> {
        self.get_string(&format!("/element/{}/text", element.0)).await
    }

    pub async fn tag_name(&self, element: &ElementRef) -> CitrusResult<String> {
        self.get_string(&format!("/element/{}/name", element.0)).await
    }

    pub async fn attribute(&self, element: &ElementRef, name: &str) -> CitrusResult<String> {
        self.get_string(&format!("/element/{}/attribute/{}", element.0, name)).await
    }

    pub async fn css_value(&self, element: &ElementRef, property: &str) -> CitrusResult<String> {
        self.get_string(&format!("/element/{}/css/{}", element.0, property)).await
    }

    pub async fn is_displayed(&self, element: &ElementRef) -> CitrusResult<bool> {
        self.get_bool(&format!("/element/{}/displayed", element.0)).await
    }

    pub async fn is_enabled(&self, element: &ElementRef) -> CitrusResult<bool> {
        self.get_bool(&format!("/element/{}/enabled", element.0)).await
    }

    pub async fn is_selected(&self, element: &ElementRef) -> CitrusResult<bool> {
        self.get_bool(&format!("/element/{}/selected", element.0)).await
    }

    /// Move the mouse over an element
    pub async fn hover(&self, element: &ElementRef) -> CitrusResult<()> {
        self.post(
            "/actions",
            json!({ "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [{ "type": "pointerMove", "duration": 0, "origin": element_arg(element), "x": 0, "y": 0 }]
            }]}),
        )
        .await
        .map(|_| ())
    }

    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> CitrusResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args })).await
    }

    pub async fn accept_alert(&self) -> CitrusResult<()> {
        self.post("/alert/accept", json!({})).await.map(|_| ())
    }

    pub async fn dismiss_alert(&self) -> CitrusResult<()> {
        self.post("/alert/dismiss", json!({})).await.map(|_| ())
    }

    pub async fn alert_text(&self) -> CitrusResult<String> {
        self.get_string("/alert/text").await
    }

    pub async fn delete_cookies(&self) -> CitrusResult<()> {
        self.command(Method::DELETE, "/cookie", None).await.map(|_| ())
    }

    /// PNG screenshot, base64 encoded
    pub async fn screenshot(&self) -> CitrusResult<String> {
        self.get_string("/screenshot").await
    }

    pub async fn window_handle(&self) -> CitrusResult<String> {
        self.get_string("/window").await
    }

    pub async fn window_handles(&self) -> CitrusResult<Vec<String>> {
        let value = self.get("/window/handles").await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Open a new tab and return its handle
    pub async fn new_window(&self) -> CitrusResult<String> {
        let value = self.post("/window/new", json!({ "type": "tab" })).await?;
        value
            .get("handle")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CitrusError::runtime("WebDriver did not return a window handle"))
    }

    pub async fn switch_to_window(&self, handle: &str) -> CitrusResult<()> {
        self.post("/window", json!({ "handle": handle })).await.map(|_| ())
    }

    pub async fn close_window(&self) -> CitrusResult<()> {
        self.command(Method::DELETE, "/window", None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::http::client::mock::MockHttpClient;

    const SERVER: &str = "http://localhost:4444";

    async fn session(mock: Arc<MockHttpClient>) -> WebDriverSession {
        mock.mock_json(
            Method::POST,
            format!("{}/session", SERVER),
            200,
            &json!({"value": {"sessionId": "s1", "capabilities": {}}}),
        )
        .unwrap();
        new_session(mock, SERVER, json!({"browserName": "chrome"}), Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_session_and_find_element() {
        let mock = Arc::new(MockHttpClient::new());
        let session = session(mock.clone()).await;
        assert_eq!(session.id(), "s1");

        mock.mock_json(
            Method::POST,
            format!("{}/session/s1/element", SERVER),
            200,
            &json!({"value": {ELEMENT_KEY: "e1"}}),
        )
        .unwrap();
        mock.mock_json(
            Method::GET,
            format!("{}/session/s1/element/e1/text", SERVER),
            200,
            &json!({"value": "Hello"}),
        )
        .unwrap();

        let element = session.find_element(&Locator::css("#greeting")).await.unwrap();
        assert_eq!(element, ElementRef("e1".to_string()));
        assert_eq!(session.text(&element).await.unwrap(), "Hello");

        let requests = mock.get_requests();
        let create: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(create["capabilities"]["alwaysMatch"]["browserName"], "chrome");
        let find: Value = serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(find["using"], "css selector");
    }

    #[tokio::test]
    async fn test_error_response() {
        let mock = Arc::new(MockHttpClient::new());
        let session = session(mock.clone()).await;
        mock.mock_json(
            Method::POST,
            format!("{}/session/s1/element", SERVER),
            404,
            &json!({"value": {"error": "no such element", "message": "Unable to locate element"}}),
        )
        .unwrap();

        let err = session.find_element(&Locator::xpath("//button")).await.unwrap_err();
        assert!(err.to_string().contains("no such element"));
    }
}
