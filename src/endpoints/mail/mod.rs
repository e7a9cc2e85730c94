//! SMTP mail server and client endpoints.
//!
//! Mails are exchanged with the test as JSON `MailRequest` payloads. A mail
//! server that does not accept mails automatically asks the test first with
//! an `AcceptRequest` and expects an `AcceptResponse`, then waits for a
//! `MailResponse` telling it which SMTP code to answer with.

pub mod client;
pub mod mime;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message};

pub use client::MailClient;
pub use server::MailServer;

const DEFAULT_SMTP_PORT: u16 = 25;
const DEFAULT_SMTP_HOST: &str = "localhost";

/// Header telling which mail model a message carries
pub const MAIL_MESSAGE_TYPE: &str = "citrus_mail_message_type";
pub const ACCEPT_REQUEST: &str = "accept-request";
pub const MAIL_REQUEST: &str = "mail-request";

/// Mail as exchanged with the test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MailRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bcc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
    #[serde(default)]
    pub subject: String,
    pub body: BodyPart,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BodyPart {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPart {
    pub file_name: String,
    pub content_type: String,
    /// Base64 encoded content
    pub content: String,
}

/// Server question whether to accept a mail for a recipient
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub accept: bool,
}

/// SMTP result of a delivered mail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailResponse {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl MailResponse {
    pub const OK_CODE: u16 = 250;

    pub fn ok() -> Self {
        Self {
            code: Self::OK_CODE,
            message: "OK".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::OK_CODE
    }
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_smtp_host() -> String {
    DEFAULT_SMTP_HOST.to_string()
}

impl MailRequest {
    pub fn from_payload(payload: &str) -> CitrusResult<Self> {
        serde_json::from_str(payload).map_err(|e| CitrusError::parse("mail message", e))
    }

    /// Message with the JSON payload and the `citrus_mail_*` headers
    pub fn to_message(&self) -> CitrusResult<Message> {
        let mut message = Message::new(serde_json::to_string_pretty(self)?)
            .with_header(MAIL_MESSAGE_TYPE, MAIL_REQUEST)
            .with_header(headers::MAIL_FROM, &self.from)
            .with_header(headers::MAIL_TO, &self.to)
            .with_header(headers::MAIL_SUBJECT, &self.subject)
            .with_header(headers::MAIL_CONTENT_TYPE, &self.body.content_type);
        if !self.cc.is_empty() {
            message.set_header(headers::MAIL_CC, &self.cc);
        }
        if !self.bcc.is_empty() {
            message.set_header(headers::MAIL_BCC, &self.bcc);
        }
        if !self.reply_to.is_empty() {
            message.set_header(headers::MAIL_REPLY_TO, &self.reply_to);
        }
        Ok(message)
    }

    /// All recipient addresses (to, cc and bcc)
    pub fn recipients(&self) -> Vec<String> {
        [&self.to, &self.cc, &self.bcc]
            .iter()
            .flat_map(|list| split_addresses(list))
            .collect()
    }
}

/// Split a comma separated address list
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(|address| address.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|address| !address.is_empty())
        .collect()
}

/// Configuration of a mail server endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MailServerConfig {
    pub name: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Accept all mails without asking the test
    #[serde(default = "default_auto_accept")]
    pub auto_accept: bool,
    /// Split multipart mails into body and attachments
    #[serde(default)]
    pub split_multipart: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
}

fn default_auto_accept() -> bool {
    true
}

/// Configuration of a mail client endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MailClientConfig {
    pub name: String,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_request_message() {
        let request = MailRequest::from_payload(
            r#"{"from":"foo@example.org","to":"bar@example.org, <baz@example.org>","bcc":"hidden@example.org","subject":"Hi","body":{"content":"Hello"}}"#,
        )
        .unwrap();
        assert_eq!(request.body.content_type, "text/plain");
        assert_eq!(
            request.recipients(),
            vec!["bar@example.org", "baz@example.org", "hidden@example.org"]
        );

        let message = request.to_message().unwrap();
        assert_eq!(message.header(headers::MAIL_SUBJECT), Some("Hi"));
        assert_eq!(message.header(headers::MAIL_BCC), Some("hidden@example.org"));
        assert_eq!(message.header(headers::MAIL_CC), None);
        assert_eq!(MailRequest::from_payload(&message.payload).unwrap(), request);
    }
}
