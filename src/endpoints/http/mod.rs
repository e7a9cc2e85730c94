//! HTTP client and server endpoints.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use client::{HttpClient, HttpClientEndpoint, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use server::HttpServerEndpoint;

// Default configuration values
const DEFAULT_REQUEST_METHOD: &str = "POST";
const DEFAULT_CONTENT_TYPE: &str = "application/json";
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_STATUS_CODE: u16 = 200;

/// What the client does with 4xx/5xx responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ErrorHandlingStrategy {
    /// Hand the error response to the test like any other response
    #[default]
    Propagate,
    /// Fail the send operation
    ThrowsException,
}

/// Configuration of an HTTP client endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpClientConfig {
    pub name: String,
    /// Base URL of all requests
    pub request_url: String,
    /// Method used when the message does not name one
    #[serde(default = "default_request_method")]
    pub request_method: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Headers added to every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Request and receive timeout in milliseconds
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub error_handling: ErrorHandlingStrategy,
}

impl HttpClientConfig {
    pub fn new(name: impl Into<String>, request_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_url: request_url.into(),
            request_method: default_request_method(),
            content_type: default_content_type(),
            headers: BTreeMap::new(),
            timeout: crate::settings::default_timeout(),
            error_handling: ErrorHandlingStrategy::default(),
        }
    }
}

/// Configuration of an HTTP server endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpServerConfig {
    pub name: String,
    /// Port to listen on, `0` picks a free port
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub auto_start: bool,
    /// Time to wait for the test to send a reply, in milliseconds
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
    /// Status returned when the test sends no reply in time
    #[serde(default = "default_status_code")]
    pub default_status_code: u16,
}

impl HttpServerConfig {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            auto_start: false,
            timeout: crate::settings::default_timeout(),
            default_status_code: default_status_code(),
        }
    }
}

fn default_request_method() -> String {
    DEFAULT_REQUEST_METHOD.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

/// Convert a query string `a=1&b=2` to the header form `a=1,b=2`
pub fn query_to_header(query: &str) -> String {
    query.split('&').filter(|p| !p.is_empty()).collect::<Vec<_>>().join(",")
}

/// Convert the header form `a=1,b=2` back to a query string
pub fn header_to_query(params: &str) -> String {
    params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("&")
}
