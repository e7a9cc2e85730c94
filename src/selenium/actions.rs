use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::webdriver::{ElementRef, Locator, WebDriverSession};
use super::{SeleniumBrowser, ACTIVE_WINDOW_VARIABLE, DOWNLOAD_FILE_VARIABLE, LAST_WINDOW_VARIABLE, SCREENSHOT_VARIABLE};
use crate::actions::TestAction;
use crate::common::{retry, RetryPolicy};
use crate::context::{TestContext, TEST_NAME_VARIABLE};
use crate::endpoints::Endpoint;
use crate::error::{CitrusError, CitrusResult};
use crate::validation::matcher;

/// Variable holding the JavaScript errors of the last `javascript` action
pub const JS_ERRORS_VARIABLE: &str = "selenium_js_errors";
const JS_ERRORS_SCRIPT: &str = "return window.citrusJsErrors || [];";
const WAIT_INTERVAL_MS: u64 = 200;

/// How to find an element; exactly one strategy is expected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElementLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_link_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
}

impl ElementLocator {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css_selector: Some(selector.into()),
            ..Default::default()
        }
    }

    /// WebDriver locator with variables resolved
    pub fn to_locator(&self, context: &TestContext) -> CitrusResult<Locator> {
        let resolve = |value: &str| context.replace_dynamic_content(value);
        let locator = if let Some(id) = &self.id {
            Locator::css(format!("[id=\"{}\"]", resolve(id)?))
        } else if let Some(name) = &self.name {
            Locator::css(format!("[name=\"{}\"]", resolve(name)?))
        } else if let Some(class_name) = &self.class_name {
            Locator::css(format!(".{}", resolve(class_name)?))
        } else if let Some(selector) = &self.css_selector {
            Locator::css(resolve(selector)?)
        } else if let Some(xpath) = &self.xpath {
            Locator::xpath(resolve(xpath)?)
        } else if let Some(text) = &self.link_text {
            Locator::link_text(resolve(text)?)
        } else if let Some(text) = &self.partial_link_text {
            Locator::partial_link_text(resolve(text)?)
        } else if let Some(tag_name) = &self.tag_name {
            Locator::tag_name(resolve(tag_name)?)
        } else {
            return Err(CitrusError::config_invalid("element", "no element locator given"));
        };
        Ok(locator)
    }
}

/// Value typed into a form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FormField {
    pub element: ElementLocator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    #[default]
    Visible,
    Hidden,
}

fn default_true() -> bool {
    true
}

/// Browser interaction of a `selenium` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SeleniumCommand {
    Start {},
    Stop {},
    /// URL (absolute or relative to the current page), `back`, `forward` or `refresh`
    Navigate {
        page: String,
    },
    #[serde(rename_all = "camelCase")]
    Find {
        element: ElementLocator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        styles: BTreeMap<String, String>,
        #[serde(default = "default_true")]
        displayed: bool,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Click {
        element: ElementLocator,
    },
    Hover {
        element: ElementLocator,
    },
    SetInput {
        element: ElementLocator,
        value: String,
    },
    FillForm {
        fields: Vec<FormField>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        submit: Option<ElementLocator>,
    },
    CheckInput {
        element: ElementLocator,
        #[serde(default = "default_true")]
        checked: bool,
    },
    /// Select one or more options of a dropdown by visible text
    Select {
        element: ElementLocator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        option: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    Alert {
        #[serde(default = "default_true")]
        accept: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    ClearCache {},
    #[serde(rename_all = "camelCase")]
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_dir: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StoreFile {
        file_path: String,
    },
    #[serde(rename_all = "camelCase")]
    GetStoredFile {
        file_name: String,
    },
    WaitUntil {
        element: ElementLocator,
        #[serde(default)]
        condition: WaitCondition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Javascript {
        script: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Value>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        expected_errors: Vec<String>,
    },
    /// Open a tab; its handle is stored in the `window` variable
    OpenWindow {
        #[serde(default = "default_window")]
        window: String,
    },
    CloseWindow {
        #[serde(default = "default_window")]
        window: String,
    },
    SwitchWindow {
        #[serde(default = "default_window")]
        window: String,
    },
}

fn default_window() -> String {
    ACTIVE_WINDOW_VARIABLE.to_string()
}

impl SeleniumCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SeleniumCommand::Start {} => "selenium:start",
            SeleniumCommand::Stop {} => "selenium:stop",
            SeleniumCommand::Navigate { .. } => "selenium:navigate",
            SeleniumCommand::Find { .. } => "selenium:find",
            SeleniumCommand::Click { .. } => "selenium:click",
            SeleniumCommand::Hover { .. } => "selenium:hover",
            SeleniumCommand::SetInput { .. } => "selenium:set-input",
            SeleniumCommand::FillForm { .. } => "selenium:fill-form",
            SeleniumCommand::CheckInput { .. } => "selenium:check-input",
            SeleniumCommand::Select { .. } => "selenium:select",
            SeleniumCommand::Alert { .. } => "selenium:alert",
            SeleniumCommand::ClearCache {} => "selenium:clear-cache",
            SeleniumCommand::Screenshot { .. } => "selenium:screenshot",
            SeleniumCommand::StoreFile { .. } => "selenium:store-file",
            SeleniumCommand::GetStoredFile { .. } => "selenium:get-stored-file",
            SeleniumCommand::WaitUntil { .. } => "selenium:wait",
            SeleniumCommand::Javascript { .. } => "selenium:javascript",
            SeleniumCommand::OpenWindow { .. } => "selenium:open-window",
            SeleniumCommand::CloseWindow { .. } => "selenium:close-window",
            SeleniumCommand::SwitchWindow { .. } => "selenium:switch-window",
        }
    }
}

/// Runs a browser command against a browser reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SeleniumAction {
    /// Browser reference, may be omitted when only one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(flatten)]
    pub command: SeleniumCommand,
}

#[async_trait]
impl TestAction for SeleniumAction {
    fn name(&self) -> &str {
        self.command.name()
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let name = match &self.browser {
            Some(name) => Some(context.replace_dynamic_content(name)?),
            None => None,
        };
        let browser = context
            .references()
            .resolve_optional_name::<SeleniumBrowser>(name.as_deref())?;
        execute_command(&browser, &self.command, context).await
    }
}

/// Resolve a page against the current URL: `/path` against its origin,
/// other relative pages against its directory
pub fn resolve_page_url(current: &str, page: &str) -> String {
    if page.contains("://") {
        return page.to_string();
    }

    let origin_end = current
        .find("://")
        .and_then(|scheme| current[scheme + 3..].find('/').map(|index| scheme + 3 + index))
        .unwrap_or(current.len());
    if let Some(path) = page.strip_prefix('/') {
        return format!("{}/{}", &current[..origin_end], path);
    }

    let directory_end = current[origin_end..]
        .rfind('/')
        .map(|index| origin_end + index)
        .unwrap_or(current.len());
    format!("{}/{}", &current[..directory_end], page)
}

async fn find(session: &WebDriverSession, element: &ElementLocator, context: &TestContext) -> CitrusResult<ElementRef> {
    let locator = element.to_locator(context)?;
    session.find_element(&locator).await
}

/// Execute a command on the given browser
pub async fn execute_command(browser: &SeleniumBrowser, command: &SeleniumCommand, context: &TestContext) -> CitrusResult<()> {
    debug!(browser = %browser.name(), command = command.name(), "Executing selenium command");
    match command {
        SeleniumCommand::Start {} => return browser.start().await,
        SeleniumCommand::Stop {} => return browser.stop().await,
        SeleniumCommand::StoreFile { file_path } => {
            browser.store_file(&context.replace_dynamic_content(file_path)?)?;
            return Ok(());
        }
        SeleniumCommand::GetStoredFile { file_name } => {
            let path = browser.get_stored_file(&context.replace_dynamic_content(file_name)?)?;
            return context.set_variable(DOWNLOAD_FILE_VARIABLE, path);
        }
        _ => {}
    }

    let session = browser.session().await?;
    match command {
        SeleniumCommand::Navigate { page } => navigate(&session, &context.replace_dynamic_content(page)?).await,
        SeleniumCommand::Find {
            element,
            tag_name,
            text,
            attributes,
            styles,
            displayed,
            enabled,
        } => {
            let found = find(&session, element, context).await?;
            if let Some(tag_name) = tag_name {
                let actual = session.tag_name(&found).await?;
                if !actual.eq_ignore_ascii_case(tag_name) {
                    return Err(CitrusError::validation(format!(
                        "Selenium web element validation failed, tag name expected '{}', but was '{}'",
                        tag_name, actual
                    )));
                }
            }
            if let Some(text) = text {
                matcher::validate_value("text", &session.text(&found).await?, text, context)?;
            }
            for (name, control) in attributes {
                let actual = session.attribute(&found, name).await?;
                matcher::validate_value(&format!("attribute '{}'", name), &actual, control, context)?;
            }
            for (property, control) in styles {
                let actual = session.css_value(&found, property).await?;
                matcher::validate_value(&format!("style '{}'", property), &actual, control, context)?;
            }
            if *displayed != session.is_displayed(&found).await? {
                return Err(CitrusError::validation(format!(
                    "Selenium web element validation failed, displayed state expected '{}'",
                    displayed
                )));
            }
            if *enabled != session.is_enabled(&found).await? {
                return Err(CitrusError::validation(format!(
                    "Selenium web element validation failed, enabled state expected '{}'",
                    enabled
                )));
            }
            info!("Selenium web element validation successful");
            Ok(())
        }
        SeleniumCommand::Click { element } => session.click(&find(&session, element, context).await?).await,
        SeleniumCommand::Hover { element } => session.hover(&find(&session, element, context).await?).await,
        SeleniumCommand::SetInput { element, value } => {
            let found = find(&session, element, context).await?;
            session.clear(&found).await?;
            session.send_keys(&found, &context.replace_dynamic_content(value)?).await
        }
        SeleniumCommand::FillForm { fields, submit } => {
            for field in fields {
                let found = find(&session, &field.element, context).await?;
                session.clear(&found).await?;
                session
                    .send_keys(&found, &context.replace_dynamic_content(&field.value)?)
                    .await?;
            }
            if let Some(submit) = submit {
                session.click(&find(&session, submit, context).await?).await?;
            }
            Ok(())
        }
        SeleniumCommand::CheckInput { element, checked } => {
            let found = find(&session, element, context).await?;
            if session.is_selected(&found).await? != *checked {
                session.click(&found).await?;
            }
            Ok(())
        }
        SeleniumCommand::Select { element, option, options } => {
            let found = find(&session, element, context).await?;
            let mut wanted: Vec<String> = option.iter().chain(options.iter()).cloned().collect();
            for value in wanted.iter_mut() {
                *value = context.replace_dynamic_content(value)?;
            }
            select_options(&session, &found, &wanted).await
        }
        SeleniumCommand::Alert { accept, text } => {
            let actual = session.alert_text().await?;
            if let Some(text) = text {
                matcher::validate_value("alert text", &actual, text, context)?;
                info!("Alert text validation successful - All values Ok");
            }
            if *accept {
                session.accept_alert().await
            } else {
                session.dismiss_alert().await
            }
        }
        SeleniumCommand::ClearCache {} => session.delete_cookies().await,
        SeleniumCommand::Screenshot { output_dir } => {
            let directory = match output_dir {
                Some(dir) => PathBuf::from(context.replace_dynamic_content(dir)?),
                None => browser.storage().to_path_buf(),
            };
            let path = screenshot(&session, directory, context).await?;
            context.set_variable(SCREENSHOT_VARIABLE, path)
        }
        SeleniumCommand::WaitUntil {
            element,
            condition,
            timeout,
        } => {
            let timeout = Duration::from_millis(timeout.unwrap_or(browser.config().timeout));
            wait_until(&session, &element.to_locator(context)?, *condition, timeout).await
        }
        SeleniumCommand::Javascript {
            script,
            arguments,
            expected_errors,
        } => {
            let script = context.replace_dynamic_content(script)?;
            session.execute_script(&script, arguments.clone()).await?;

            let errors: Vec<String> = session
                .execute_script(JS_ERRORS_SCRIPT, Vec::new())
                .await?
                .as_array()
                .map(|errors| {
                    errors
                        .iter()
                        .map(|error| error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            context.set_variable(JS_ERRORS_VARIABLE, errors.join(","))?;

            for expected in expected_errors {
                let expected = context.replace_dynamic_content(expected)?;
                if !errors.contains(&expected) {
                    return Err(CitrusError::validation(format!(
                        "Missing JavaScript error {}",
                        expected
                    )));
                }
            }
            Ok(())
        }
        SeleniumCommand::OpenWindow { window } => {
            let last = session.window_handle().await?;
            let opened = session.new_window().await?;
            session.switch_to_window(&opened).await?;
            info!("Open window: {}", opened);
            context.set_variable(LAST_WINDOW_VARIABLE, last)?;
            context.set_variable(window, opened.clone())?;
            context.set_variable(ACTIVE_WINDOW_VARIABLE, opened)
        }
        SeleniumCommand::SwitchWindow { window } => {
            let handle = context.get_variable(window)?;
            let current = session.window_handle().await?;
            if handle != current {
                info!("Switch window focus to: {}", handle);
                session.switch_to_window(&handle).await?;
                context.set_variable(LAST_WINDOW_VARIABLE, current)?;
                context.set_variable(ACTIVE_WINDOW_VARIABLE, handle)?;
            }
            Ok(())
        }
        SeleniumCommand::CloseWindow { window } => {
            let handle = context.get_variable(window)?;
            if session.window_handle().await? != handle {
                session.switch_to_window(&handle).await?;
            }
            info!("Close window: {}", handle);
            session.close_window().await?;

            let next = match context.get_variable(LAST_WINDOW_VARIABLE) {
                Ok(last) if last != handle => Some(last),
                _ => session.window_handles().await?.into_iter().next(),
            };
            if let Some(next) = next {
                session.switch_to_window(&next).await?;
                context.set_variable(ACTIVE_WINDOW_VARIABLE, next)?;
            }
            Ok(())
        }
        SeleniumCommand::Start {}
        | SeleniumCommand::Stop {}
        | SeleniumCommand::StoreFile { .. }
        | SeleniumCommand::GetStoredFile { .. } => Ok(()),
    }
}

async fn navigate(session: &WebDriverSession, page: &str) -> CitrusResult<()> {
    match page {
        "back" => session.back().await,
        "forward" => session.forward().await,
        "refresh" => session.refresh().await,
        url if url.contains("://") => session.navigate(url).await,
        relative => {
            let current = session.current_url().await?;
            session.navigate(&resolve_page_url(&current, relative)).await
        }
    }
}

async fn select_options(session: &WebDriverSession, select: &ElementRef, wanted: &[String]) -> CitrusResult<()> {
    let options = session.find_child_elements(select, &Locator::tag_name("option")).await?;
    for value in wanted {
        let mut matched = None;
        for option in &options {
            if session.text(option).await?.trim() == value {
                matched = Some(option);
                break;
            }
        }
        let option = matched.ok_or_else(|| CitrusError::runtime(format!("Cannot locate option with text: {}", value)))?;
        if !session.is_selected(option).await? {
            session.click(option).await?;
        }
    }
    Ok(())
}

async fn screenshot(session: &WebDriverSession, directory: PathBuf, context: &TestContext) -> CitrusResult<String> {
    let data = session.screenshot().await?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CitrusError::parse("screenshot", e))?;

    let prefix = context
        .get_variable(TEST_NAME_VARIABLE)
        .unwrap_or_else(|_| "screenshot".to_string());
    std::fs::create_dir_all(&directory)?;
    let path = directory.join(format!("{}_{}.png", prefix, uuid::Uuid::new_v4().simple()));
    std::fs::write(&path, bytes)?;
    info!("Screenshot saved to {}", path.display());
    Ok(path.display().to_string())
}

async fn wait_until(session: &WebDriverSession, locator: &Locator, condition: WaitCondition, timeout: Duration) -> CitrusResult<()> {
    let policy = RetryPolicy::for_timeout(timeout, Duration::from_millis(WAIT_INTERVAL_MS));
    retry(policy, "Wait for element", |_| async move {
        let displayed = match session.find_elements(locator).await?.first() {
            Some(element) => session.is_displayed(element).await?,
            None => false,
        };
        match (condition, displayed) {
            (WaitCondition::Visible, true) | (WaitCondition::Hidden, false) => Ok(()),
            _ => Err(CitrusError::runtime(format!("Element '{}' is not {:?} yet", locator, condition))),
        }
    })
    .await
    .map_err(|_| {
        CitrusError::runtime(format!(
            "Failed to wait for element '{}' to be {:?} within {} ms",
            locator,
            condition,
            timeout.as_millis()
        ))
    })
}
