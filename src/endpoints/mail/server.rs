use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use super::{mime, AcceptRequest, AcceptResponse, MailResponse, MailServerConfig, ACCEPT_REQUEST, MAIL_MESSAGE_TYPE};
use crate::context::TestContext;
use crate::endpoints::server::ServerExchange;
use crate::endpoints::{BaseEndpoint, Endpoint};
use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageSelector};

/// Settings and exchange shared with the connection handlers
struct SmtpSession {
    name: String,
    auto_accept: bool,
    split_multipart: bool,
    timeout: Duration,
    exchange: ServerExchange,
}

/// SMTP server handing received mails to the test
pub struct MailServer {
    config: MailServerConfig,
    base: BaseEndpoint,
    session: Arc<SmtpSession>,
    bound_port: std::sync::atomic::AtomicU16,
}

impl MailServer {
    pub fn new(config: MailServerConfig) -> Self {
        Self {
            base: BaseEndpoint::new(&config.name),
            session: Arc::new(SmtpSession {
                name: config.name.clone(),
                auto_accept: config.auto_accept,
                split_multipart: config.split_multipart,
                timeout: Duration::from_millis(config.timeout),
                exchange: ServerExchange::new(config.name.clone()),
            }),
            bound_port: std::sync::atomic::AtomicU16::new(config.port),
            config,
        }
    }

    /// Port the server listens on; the actual port once started with port `0`
    pub fn port(&self) -> u16 {
        self.bound_port.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl SmtpSession {
    /// Ask the test whether to accept a mail for the recipient
    async fn accept(&self, from: &str, to: &str) -> bool {
        if self.auto_accept {
            return true;
        }

        let request = AcceptRequest {
            from: from.to_string(),
            to: to.to_string(),
        };
        let payload = match serde_json::to_string(&request) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize accept request");
                return false;
            }
        };

        let message = Message::new(payload).with_header(MAIL_MESSAGE_TYPE, ACCEPT_REQUEST);
        match self.exchange.handle(message, self.timeout).await {
            Some(reply) => match serde_json::from_str::<AcceptResponse>(&reply.payload) {
                Ok(response) => response.accept,
                Err(e) => {
                    warn!(error = %e, "Invalid accept response, rejecting mail");
                    false
                }
            },
            None => false,
        }
    }

    /// Hand a mail to the test and get the SMTP result
    async fn deliver(&self, text: &str, from: &str, recipients: &[String]) -> MailResponse {
        let request = mime::parse(text, from, recipients, self.split_multipart);
        let message = match request.to_message() {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Failed to convert mail");
                return MailResponse {
                    code: 451,
                    message: "Requested action aborted: local error in processing".to_string(),
                };
            }
        };

        if self.auto_accept {
            self.exchange.enqueue(message);
            return MailResponse::ok();
        }

        match self.exchange.handle(message, self.timeout).await {
            Some(reply) => serde_json::from_str(&reply.payload).unwrap_or_else(|e| {
                warn!(error = %e, "Invalid mail response, answering with OK");
                MailResponse::ok()
            }),
            None => MailResponse::ok(),
        }
    }

    /// Run the SMTP dialog on one connection
    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(format!("220 {} Citrus SMTP server ready\r\n", self.name).as_bytes())
            .await?;

        let mut from = String::new();
        let mut recipients: Vec<String> = Vec::new();

        while let Some(line) = lines.next_line().await? {
            let command = line.to_ascii_uppercase();
            let reply = if command.starts_with("EHLO") || command.starts_with("HELO") {
                "250 Hello".to_string()
            } else if command.starts_with("MAIL FROM:") {
                from = address_argument(&line);
                recipients.clear();
                "250 OK".to_string()
            } else if command.starts_with("RCPT TO:") {
                let recipient = address_argument(&line);
                if self.accept(&from, &recipient).await {
                    recipients.push(recipient);
                    "250 OK".to_string()
                } else {
                    "553 Recipient rejected".to_string()
                }
            } else if command == "DATA" {
                if recipients.is_empty() {
                    "503 Need RCPT command".to_string()
                } else {
                    writer
                        .write_all(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                        .await?;
                    let mut data = Vec::new();
                    while let Some(data_line) = lines.next_line().await? {
                        if data_line == "." {
                            break;
                        }
                        // undo dot stuffing
                        data.push(data_line.strip_prefix('.').map(str::to_string).unwrap_or(data_line));
                    }

                    let response = self.deliver(&data.join("\r\n"), &from, &recipients).await;
                    from.clear();
                    recipients.clear();
                    format!("{} {}", response.code, response.message)
                }
            } else if command == "RSET" {
                from.clear();
                recipients.clear();
                "250 OK".to_string()
            } else if command == "NOOP" {
                "250 OK".to_string()
            } else if command == "QUIT" {
                writer.write_all(b"221 Bye\r\n").await?;
                break;
            } else {
                "502 Command not implemented".to_string()
            };

            writer.write_all(format!("{}\r\n", reply).as_bytes()).await?;
        }
        Ok(())
    }
}

/// Address of `MAIL FROM:<a@b> SIZE=10` style arguments
fn address_argument(line: &str) -> String {
    let argument = line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or_default();
    match (argument.find('<'), argument.find('>')) {
        (Some(start), Some(end)) if start < end => argument[start + 1..end].to_string(),
        _ => argument.split_whitespace().next().unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl Endpoint for MailServer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "mail-server"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    fn auto_start(&self) -> bool {
        self.config.auto_start
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    #[instrument(skip(self), level = "debug")]
    async fn start(&self) -> CitrusResult<()> {
        if self.base.is_running() {
            return Ok(());
        }

        let listener = TcpListener::bind(("0.0.0.0", self.config.port))
            .await
            .map_err(|e| CitrusError::endpoint(&self.config.name, format!("failed to bind port {}: {}", self.config.port, e)))?;
        let port = listener.local_addr()?.port();
        self.bound_port.store(port, std::sync::atomic::Ordering::SeqCst);

        let mut shutdown_rx = self.base.create_shutdown_channel().await;
        let session = Arc::clone(&self.session);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(endpoint = %session.name, "Mail server shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!(endpoint = %session.name, peer = %peer, "SMTP connection accepted");
                                let session = Arc::clone(&session);
                                tokio::spawn(async move {
                                    if let Err(e) = session.handle_connection(stream).await {
                                        warn!(error = %e, "SMTP connection failed");
                                    }
                                });
                            }
                            Err(e) => error!(endpoint = %session.name, error = %e, "Failed to accept SMTP connection"),
                        }
                    }
                }
            }
        });
        self.base.set_task(handle).await;
        self.base.set_running(true);

        info!(endpoint = %self.config.name, port, "Mail server started");
        Ok(())
    }

    async fn stop(&self) -> CitrusResult<()> {
        self.base.stop_task().await;
        Ok(())
    }

    /// Sends an accept response or mail response to the waiting SMTP session
    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        self.session.exchange.reply(message)
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        self.session.exchange.receive(selector, timeout).await
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.session.exchange.purge(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_argument() {
        assert_eq!(address_argument("MAIL FROM:<foo@example.org> SIZE=100"), "foo@example.org");
        assert_eq!(address_argument("RCPT TO: bar@example.org"), "bar@example.org");
    }
}
