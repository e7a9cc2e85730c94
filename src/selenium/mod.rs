//! Selenium browser endpoint driving a WebDriver server.

pub mod actions;
pub mod webdriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::context::TestContext;
use crate::endpoints::http::{HttpClient, ReqwestHttpClient};
use crate::endpoints::{BaseEndpoint, Endpoint};
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageSelector};

pub use actions::{ElementLocator, SeleniumAction, SeleniumCommand};
pub use webdriver::{ElementRef, Locator, WebDriverSession};

/// Variable holding the path of the last screenshot
pub const SCREENSHOT_VARIABLE: &str = "selenium_screenshot";
/// Variable holding the path of a file fetched from the browser storage
pub const DOWNLOAD_FILE_VARIABLE: &str = "selenium_download_file";
/// Variables tracking the window handles
pub const ACTIVE_WINDOW_VARIABLE: &str = "selenium_active_window";
pub const LAST_WINDOW_VARIABLE: &str = "selenium_last_window";

/// Browsers a session can be requested for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chrome,
    Firefox,
    Edge,
    Safari,
    Htmlunit,
}

impl BrowserType {
    /// W3C `browserName` capability
    pub fn browser_name(self) -> &'static str {
        match self {
            BrowserType::Chrome => "chrome",
            BrowserType::Firefox => "firefox",
            BrowserType::Edge => "MicrosoftEdge",
            BrowserType::Safari => "safari",
            BrowserType::Htmlunit => "htmlunit",
        }
    }

    /// Default address of the local driver binary
    fn local_driver_url(self) -> Option<&'static str> {
        match self {
            BrowserType::Chrome | BrowserType::Edge => Some("http://localhost:9515"),
            BrowserType::Firefox | BrowserType::Safari => Some("http://localhost:4444"),
            BrowserType::Htmlunit => None,
        }
    }
}

impl FromStr for BrowserType {
    type Err = CitrusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "chrome" => Ok(BrowserType::Chrome),
            "firefox" => Ok(BrowserType::Firefox),
            "edge" | "microsoftedge" => Ok(BrowserType::Edge),
            "safari" => Ok(BrowserType::Safari),
            "htmlunit" => Ok(BrowserType::Htmlunit),
            other => Err(CitrusError::config_invalid(
                "browserType",
                format!("unsupported browser type '{}'", other),
            )),
        }
    }
}

/// Configuration of a browser endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeleniumBrowserConfig {
    pub name: String,
    #[serde(default)]
    pub browser_type: BrowserType,
    /// Remote WebDriver (Grid) address; local driver defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_server_url: Option<String>,
    /// Page opened right after the browser started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_page_url: Option<String>,
    /// Extra capabilities merged into the session request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "default_javascript")]
    pub javascript: bool,
    /// Command timeout in milliseconds
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
}

fn default_javascript() -> bool {
    true
}

impl SeleniumBrowserConfig {
    pub fn new(name: impl Into<String>, browser_type: BrowserType) -> Self {
        Self {
            name: name.into(),
            browser_type,
            remote_server_url: None,
            start_page_url: None,
            capabilities: BTreeMap::new(),
            version: None,
            javascript: default_javascript(),
            timeout: crate::settings::default_timeout(),
        }
    }

    pub fn with_remote_server_url(mut self, url: impl Into<String>) -> Self {
        self.remote_server_url = Some(url.into());
        self
    }

    pub fn with_start_page_url(mut self, url: impl Into<String>) -> Self {
        self.start_page_url = Some(url.into());
        self
    }
}

/// Browser endpoint holding at most one WebDriver session
pub struct SeleniumBrowser {
    config: SeleniumBrowserConfig,
    base: BaseEndpoint,
    client: Arc<dyn HttpClient>,
    session: RwLock<Option<WebDriverSession>>,
    /// Directory for stored and downloaded files
    storage: PathBuf,
}

impl SeleniumBrowser {
    pub fn new(config: SeleniumBrowserConfig) -> CitrusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout))
            .build()
            .map_err(|e| CitrusError::endpoint(&config.name, e))?;
        Self::with_client(config, Arc::new(ReqwestHttpClient::with_client(client)))
    }

    /// Use a custom HTTP client for the WebDriver protocol
    pub fn with_client(config: SeleniumBrowserConfig, client: Arc<dyn HttpClient>) -> CitrusResult<Self> {
        let storage = std::env::temp_dir().join(format!("citrus-selenium-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&storage)
            .map_err(|e| CitrusError::runtime(format!("Could not create temporary storage: {}", e)))?;
        info!(browser = %config.name, storage = %storage.display(), "Download storage location");

        Ok(Self {
            base: BaseEndpoint::new(&config.name),
            config,
            client,
            session: RwLock::new(None),
            storage,
        })
    }

    pub fn config(&self) -> &SeleniumBrowserConfig {
        &self.config
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// Address of the WebDriver server sessions are created on
    pub fn driver_url(&self) -> CitrusResult<String> {
        if let Some(url) = &self.config.remote_server_url {
            return Ok(url.clone());
        }
        if let Ok(url) = std::env::var("CITRUS_SELENIUM_DRIVER_URL") {
            return Ok(url);
        }
        self.config
            .browser_type
            .local_driver_url()
            .map(str::to_string)
            .ok_or_else(|| {
                CitrusError::config_invalid(
                    "remoteServerUrl",
                    format!("browser type {:?} requires a remote server", self.config.browser_type),
                )
            })
    }

    /// Session capabilities for the configured browser
    pub fn capabilities(&self) -> Value {
        let mut capabilities = Map::new();
        capabilities.insert("browserName".to_string(), json!(self.config.browser_type.browser_name()));
        if let Some(version) = &self.config.version {
            capabilities.insert("browserVersion".to_string(), json!(version));
        }

        match self.config.browser_type {
            BrowserType::Chrome | BrowserType::Edge => {
                capabilities.insert("acceptInsecureCerts".to_string(), json!(true));
            }
            BrowserType::Firefox => {
                capabilities.insert(
                    "moz:firefoxOptions".to_string(),
                    json!({ "prefs": { "browser.download.dir": self.storage.display().to_string() } }),
                );
            }
            BrowserType::Htmlunit => {
                capabilities.insert("garg:javascriptEnabled".to_string(), json!(self.config.javascript));
            }
            BrowserType::Safari => {}
        }

        for (key, value) in &self.config.capabilities {
            capabilities.insert(key.clone(), value.clone());
        }
        Value::Object(capabilities)
    }

    /// Current session, fails when the browser is not started
    pub async fn session(&self) -> CitrusResult<WebDriverSession> {
        self.session.read().await.clone().ok_or_else(|| {
            CitrusError::runtime(format!("Browser '{}' is not started", self.config.name))
        })
    }

    /// Copy a file into the browser storage, returns the stored path
    pub fn store_file(&self, location: &str) -> CitrusResult<String> {
        let source = Path::new(location);
        let file_name = source
            .file_name()
            .ok_or_else(|| CitrusError::runtime(format!("Failed to store file: {}", location)))?;
        let target = self.storage.join(file_name);
        info!("Store file {} to {}", location, target.display());

        std::fs::copy(source, &target)
            .map_err(|e| CitrusError::runtime(format!("Failed to store file: {}: {}", location, e)))?;
        Ok(target.display().to_string())
    }

    /// Path of a file in the browser storage
    pub fn get_stored_file(&self, file_name: &str) -> CitrusResult<String> {
        let stored = self.storage.join(file_name);
        if !stored.exists() {
            return Err(CitrusError::runtime(format!(
                "Failed to access stored file: {}",
                stored.display()
            )));
        }
        Ok(stored.display().to_string())
    }
}

#[async_trait]
impl Endpoint for SeleniumBrowser {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "selenium-browser"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    #[instrument(skip(self), fields(browser = %self.config.name), level = "debug")]
    async fn start(&self) -> CitrusResult<()> {
        let mut session = self.session.write().await;
        if session.is_some() {
            debug!("Browser already started");
            return Ok(());
        }

        let driver_url = self.driver_url()?;
        info!(browser_type = ?self.config.browser_type, driver = %driver_url, "Starting browser");
        let created = webdriver::new_session(
            Arc::clone(&self.client),
            &driver_url,
            self.capabilities(),
            self.timeout(),
        )
        .await?;

        if let Some(start_page) = &self.config.start_page_url {
            info!("Opening start page: {}", start_page);
            created.navigate(start_page).await?;
        }

        *session = Some(created);
        self.base.set_running(true);
        Ok(())
    }

    #[instrument(skip(self), fields(browser = %self.config.name), level = "debug")]
    async fn stop(&self) -> CitrusResult<()> {
        let Some(session) = self.session.write().await.take() else {
            warn!("Browser already stopped");
            return Ok(());
        };
        self.base.set_running(false);

        info!(session = %session.id(), "Trying to close the browser");
        if let Err(e) = session.quit().await {
            warn!(error = %e, "Failed to close browser");
        }
        Ok(())
    }

    /// Runs a selenium command given as JSON or YAML payload
    async fn send(&self, message: Message, context: &TestContext) -> CitrusResult<()> {
        let command: SeleniumCommand = serde_yaml::from_str(&message.payload)
            .map_err(|e| CitrusError::parse("selenium command", e))?;
        actions::execute_command(self, &command, context).await?;
        info!("Selenium action successfully executed");
        Ok(())
    }

    async fn receive(
        &self,
        _selector: Option<&MessageSelector>,
        _timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        Err(CitrusError::endpoint(
            &self.config.name,
            "selenium browser does not support receiving messages",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::http::client::mock::MockHttpClient;
    use http::Method;

    #[test]
    fn test_config_from_yaml() {
        let config: SeleniumBrowserConfig = serde_yaml::from_str(
            "name: browser\nbrowserType: firefox\nstartPageUrl: http://localhost:8080\ncapabilities:\n  pageLoadStrategy: eager\n",
        )
        .unwrap();
        assert_eq!(config.browser_type, BrowserType::Firefox);
        assert!(config.javascript);

        let browser = SeleniumBrowser::with_client(config, Arc::new(MockHttpClient::new())).unwrap();
        let capabilities = browser.capabilities();
        assert_eq!(capabilities["browserName"], "firefox");
        assert_eq!(capabilities["pageLoadStrategy"], "eager");
        assert!(capabilities["moz:firefoxOptions"]["prefs"]["browser.download.dir"].is_string());
    }

    #[test]
    fn test_browser_type_from_str() {
        assert_eq!("MicrosoftEdge".parse::<BrowserType>().unwrap(), BrowserType::Edge);
        assert!("opera".parse::<BrowserType>().is_err());
    }

    #[test]
    fn test_htmlunit_requires_remote_server() {
        let browser = SeleniumBrowser::with_client(
            SeleniumBrowserConfig::new("browser", BrowserType::Htmlunit),
            Arc::new(MockHttpClient::new()),
        )
        .unwrap();
        if std::env::var("CITRUS_SELENIUM_DRIVER_URL").is_err() {
            assert!(browser.driver_url().is_err());
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mock = Arc::new(MockHttpClient::new());
        mock.mock_json(
            Method::POST,
            "http://grid:4444/session",
            200,
            &json!({"value": {"sessionId": "abc"}}),
        )
        .unwrap();
        mock.mock_json(Method::POST, "http://grid:4444/session/abc/url", 200, &json!({"value": null}))
            .unwrap();

        let config = SeleniumBrowserConfig::new("browser", BrowserType::Chrome)
            .with_remote_server_url("http://grid:4444")
            .with_start_page_url("http://localhost:8080/index.html");
        let browser = SeleniumBrowser::with_client(config, mock.clone()).unwrap();

        browser.start().await.unwrap();
        assert!(browser.is_running());
        assert_eq!(browser.session().await.unwrap().id(), "abc");

        // quit is not mocked, the failure is only logged
        browser.stop().await.unwrap();
        assert!(!browser.is_running());
        assert!(browser.session().await.is_err());
        assert_eq!(mock.get_requests().len(), 3);
    }

    #[test]
    fn test_store_file() {
        let browser = SeleniumBrowser::with_client(
            SeleniumBrowserConfig::new("browser", BrowserType::Chrome),
            Arc::new(MockHttpClient::new()),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("upload.txt");
        std::fs::write(&file, "data").unwrap();

        let stored = browser.store_file(&file.display().to_string()).unwrap();
        assert_eq!(std::fs::read_to_string(&stored).unwrap(), "data");
        assert_eq!(browser.get_stored_file("upload.txt").unwrap(), stored);
        assert!(browser.get_stored_file("missing.txt").is_err());
    }
}
