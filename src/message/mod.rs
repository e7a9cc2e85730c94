//! Message model shared by all endpoints.
//!
//! A message is a text payload plus a header map. Endpoint specific
//! information (HTTP method, status code, mail addresses, ...) travels in
//! headers prefixed with `citrus_`.

pub mod queue;
pub mod selector;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CitrusError, CitrusResult};

pub use queue::MessageQueue;
pub use selector::MessageSelector;

/// Prefix of all internal message headers
pub const HEADER_PREFIX: &str = "citrus_";

pub mod headers {
    pub const MESSAGE_ID: &str = "citrus_message_id";
    pub const MESSAGE_NAME: &str = "citrus_message_name";
    pub const MESSAGE_TIMESTAMP: &str = "citrus_message_timestamp";
    pub const MESSAGE_TYPE: &str = "citrus_message_type";

    pub const HTTP_METHOD: &str = "citrus_http_method";
    pub const HTTP_REQUEST_URI: &str = "citrus_http_request_uri";
    pub const HTTP_REQUEST_PATH: &str = "citrus_request_path";
    pub const HTTP_QUERY_PARAMS: &str = "citrus_query_params";
    pub const HTTP_STATUS_CODE: &str = "citrus_http_status_code";
    pub const HTTP_REASON_PHRASE: &str = "citrus_http_reason_phrase";
    pub const HTTP_CONTENT_TYPE: &str = "Content-Type";
    pub const ENDPOINT_URI: &str = "citrus_endpoint_uri";

    pub const SSH_USER: &str = "citrus_ssh_user";
    pub const SSH_COMMAND: &str = "citrus_ssh_command";
    pub const SSH_EXIT: &str = "citrus_ssh_exit";

    pub const MAIL_FROM: &str = "citrus_mail_from";
    pub const MAIL_TO: &str = "citrus_mail_to";
    pub const MAIL_CC: &str = "citrus_mail_cc";
    pub const MAIL_BCC: &str = "citrus_mail_bcc";
    pub const MAIL_SUBJECT: &str = "citrus_mail_subject";
    pub const MAIL_REPLY_TO: &str = "citrus_mail_replyto";
    pub const MAIL_CONTENT_TYPE: &str = "citrus_mail_content_type";
    pub const MAIL_DATE: &str = "citrus_mail_date";
}

/// Message exchanged with an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: String,
    /// Optional message name used to store and look up messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Text payload
    pub payload: String,
    /// Message headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Creation time
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    /// Create a new message with the given payload
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            payload: payload.into(),
            headers: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a message without payload
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Header value by exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Header value, trying the exact name first and then a case-insensitive match
    pub fn header_ignore_case(&self, name: &str) -> Option<&str> {
        self.header(name).or_else(|| {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    /// Headers that are not framework internal
    pub fn custom_headers(&self) -> impl Iterator<Item = (&String, &String)> {
        self.headers
            .iter()
            .filter(|(key, _)| !key.starts_with(HEADER_PREFIX))
    }

    /// Header lookup that also knows the implicit message id and name headers
    pub fn header_value(&self, name: &str) -> Option<String> {
        match name {
            headers::MESSAGE_ID => Some(self.id.clone()),
            headers::MESSAGE_NAME => self.name.clone(),
            headers::MESSAGE_TIMESTAMP => Some(self.timestamp.timestamp_millis().to_string()),
            _ => self.header(name).map(str::to_string),
        }
    }

    /// Parse the payload as JSON
    pub fn payload_as_json(&self) -> CitrusResult<serde_json::Value> {
        serde_json::from_str(&self.payload).map_err(|e| {
            CitrusError::parse("JSON", format!("message payload is not valid JSON: {}", e))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.payload.trim().is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message [id: {}", self.id)?;
        if let Some(name) = &self.name {
            write!(f, ", name: {}", name)?;
        }
        write!(f, ", headers: {:?}, payload: {}]", self.headers, self.payload)
    }
}

/// Payload format used to pick a message validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Json,
    Xml,
    Plaintext,
}

impl MessageType {
    /// Guess the message type from the payload
    pub fn detect(payload: &str) -> Self {
        let trimmed = payload.trim_start();
        if trimmed.starts_with('<') {
            MessageType::Xml
        } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(payload).is_ok()
        {
            MessageType::Json
        } else {
            MessageType::Plaintext
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = CitrusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(MessageType::Json),
            "xml" => Ok(MessageType::Xml),
            "plaintext" | "text" | "plain" => Ok(MessageType::Plaintext),
            other => Err(CitrusError::config_invalid(
                "messageType",
                format!("unsupported message type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Json => write!(f, "json"),
            MessageType::Xml => write!(f, "xml"),
            MessageType::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// Messages sent and received during a test, addressed by name
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: DashMap<String, Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, name: impl Into<String>, message: Message) {
        self.messages.insert(name.into(), message);
    }

    pub fn get(&self, name: &str) -> Option<Message> {
        self.messages.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Name under which an unnamed message is stored
    pub fn store_name(endpoint: &str, direction: &str) -> String {
        format!("{}:{}", direction, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_message_type() {
        assert_eq!(MessageType::detect(r#"{"a": 1}"#), MessageType::Json);
        assert_eq!(MessageType::detect("  <root/>"), MessageType::Xml);
        assert_eq!(MessageType::detect("{ not json"), MessageType::Plaintext);
        assert_eq!(MessageType::detect("Hello"), MessageType::Plaintext);
    }

    #[test]
    fn test_header_lookup() {
        let message = Message::new("Hello")
            .with_header("Content-Type", "text/plain")
            .with_header(headers::HTTP_METHOD, "GET")
            .with_name("greeting");

        assert_eq!(message.header_ignore_case("content-type"), Some("text/plain"));
        assert_eq!(message.custom_headers().count(), 1);
        assert_eq!(message.header_value(headers::MESSAGE_NAME).as_deref(), Some("greeting"));
        assert_eq!(message.header_value(headers::MESSAGE_ID), Some(message.id.clone()));
    }
}
