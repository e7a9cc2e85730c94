use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use super::{mime, MailClientConfig, MailRequest, MailResponse};
use crate::context::TestContext;
use crate::endpoints::Endpoint;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageQueue, MessageSelector};

/// SMTP client sending `MailRequest` messages; the SMTP result of each mail
/// is kept as `MailResponse` until the test receives it
pub struct MailClient {
    config: MailClientConfig,
    responses: MessageQueue,
}

struct SmtpConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl SmtpConnection {
    /// Read a (possibly multi line) reply, returns code and text of the last line
    async fn read_reply(&mut self) -> CitrusResult<(u16, String)> {
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .ok_or_else(|| CitrusError::runtime("SMTP connection closed unexpectedly"))?;
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| CitrusError::parse("SMTP reply", &line))?;
            // "250-" marks a continuation line
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok((code, line.get(4..).unwrap_or_default().to_string()));
            }
        }
    }

    async fn command(&mut self, command: &str) -> CitrusResult<(u16, String)> {
        debug!(command = %command, "SMTP command");
        self.writer.write_all(format!("{}\r\n", command).as_bytes()).await?;
        self.read_reply().await
    }
}

fn is_positive(code: u16) -> bool {
    (200..400).contains(&code)
}

impl MailClient {
    pub fn new(config: MailClientConfig) -> Self {
        Self {
            responses: MessageQueue::new(format!("{}.responses", config.name)),
            config,
        }
    }

    /// Run the SMTP dialog, negative replies end the dialog with that reply
    #[instrument(skip(self, request), level = "debug")]
    async fn deliver(&self, request: &MailRequest) -> CitrusResult<MailResponse> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                CitrusError::endpoint(
                    &self.config.name,
                    format!("failed to connect to {}:{}: {}", self.config.host, self.config.port, e),
                )
            })?;
        let (reader, writer) = stream.into_split();
        let mut connection = SmtpConnection {
            lines: BufReader::new(reader).lines(),
            writer,
        };

        let (code, text) = connection.read_reply().await?;
        if !is_positive(code) {
            return Ok(MailResponse { code, message: text });
        }

        let mut commands = vec!["EHLO citrus".to_string()];
        if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
            let token = base64::engine::general_purpose::STANDARD.encode(format!("\0{}\0{}", user, password));
            commands.push(format!("AUTH PLAIN {}", token));
        }
        commands.push(format!("MAIL FROM:<{}>", super::split_addresses(&request.from).join("")));
        for recipient in request.recipients() {
            commands.push(format!("RCPT TO:<{}>", recipient));
        }
        commands.push("DATA".to_string());

        for command in &commands {
            let (code, text) = connection.command(command).await?;
            if !is_positive(code) {
                let _ = connection.command("QUIT").await;
                return Ok(MailResponse { code, message: text });
            }
        }

        let boundary = format!("citrus-{}", uuid::Uuid::new_v4().simple());
        let mut data = String::new();
        for line in mime::render(request, &boundary).split("\r\n") {
            if line.starts_with('.') {
                data.push('.');
            }
            data.push_str(line);
            data.push_str("\r\n");
        }
        data.push_str(".\r\n");
        connection.writer.write_all(data.as_bytes()).await?;
        let (code, text) = connection.read_reply().await?;

        let _ = connection.command("QUIT").await;
        Ok(MailResponse { code, message: text })
    }
}

#[async_trait]
impl Endpoint for MailClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "mail-client"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        let request = MailRequest::from_payload(&message.payload)?;
        info!(endpoint = %self.config.name, to = %request.to, subject = %request.subject, "Sending mail");

        let response = tokio::time::timeout(self.timeout(), self.deliver(&request))
            .await
            .map_err(|_| CitrusError::timeout(&self.config.name, self.timeout()))??;
        debug!(code = response.code, "Mail delivered");

        self.responses.push(Message::new(serde_json::to_string(&response)?));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::mail::{MailServer, MailServerConfig, ACCEPT_REQUEST, MAIL_MESSAGE_TYPE};
    use crate::message::headers;
    use std::sync::Arc;

    fn server_config(auto_accept: bool) -> MailServerConfig {
        MailServerConfig {
            name: "mailServer".to_string(),
            port: 0,
            auto_accept,
            split_multipart: false,
            auto_start: false,
            timeout: 2000,
        }
    }

    fn client(port: u16) -> MailClient {
        MailClient::new(MailClientConfig {
            name: "mailClient".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            username: None,
            password: None,
            timeout: 5000,
        })
    }

    const MAIL: &str = r#"{"from":"foo@example.org","to":"bar@example.org","subject":"Hello","body":{"content":"Hi there\n.hidden dot"}}"#;

    #[tokio::test]
    async fn test_auto_accepted_mail() {
        let server = MailServer::new(server_config(true));
        server.start().await.unwrap();
        let client = client(server.port());
        let context = TestContext::new();

        client.send(Message::new(MAIL), &context).await.unwrap();
        let response = client.receive(None, Duration::from_secs(1), &context).await.unwrap();
        let response: MailResponse = serde_json::from_str(&response.payload).unwrap();
        assert!(response.is_ok());

        let mail = server.receive(None, Duration::from_secs(1), &context).await.unwrap();
        assert_eq!(mail.header(headers::MAIL_SUBJECT), Some("Hello"));
        let request = MailRequest::from_payload(&mail.payload).unwrap();
        assert_eq!(request.body.content, "Hi there\n.hidden dot");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_test_driven_rejection() {
        let server = Arc::new(MailServer::new(server_config(false)));
        server.start().await.unwrap();
        let client = client(server.port());
        let context = TestContext::new();

        let test_side = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let context = TestContext::new();
                let accept = server.receive(None, Duration::from_secs(2), &context).await.unwrap();
                assert_eq!(accept.header(MAIL_MESSAGE_TYPE), Some(ACCEPT_REQUEST));
                server
                    .send(Message::new(r#"{"accept":true}"#), &context)
                    .await
                    .unwrap();

                server.receive(None, Duration::from_secs(2), &context).await.unwrap();
                server
                    .send(Message::new(r#"{"code":550,"message":"Mailbox unavailable"}"#), &context)
                    .await
                    .unwrap();
            })
        };

        client.send(Message::new(MAIL), &context).await.unwrap();
        test_side.await.unwrap();

        let response = client.receive(None, Duration::from_secs(1), &context).await.unwrap();
        let response: MailResponse = serde_json::from_str(&response.payload).unwrap();
        assert_eq!(response.code, 550);
        assert_eq!(response.message, "Mailbox unavailable");

        server.stop().await.unwrap();
    }
}
