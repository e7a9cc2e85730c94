//! WebSocket client endpoint.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument};

use super::{BaseEndpoint, Endpoint};
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message, MessageQueue, MessageSelector};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Configuration of a WebSocket client endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClientConfig {
    pub name: String,
    /// `ws://` or `wss://` URL
    pub url: String,
    #[serde(default = "crate::settings::default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub auto_start: bool,
}

/// Client that connects to a WebSocket server.
///
/// Text frames received from the server are queued for `receive`; the
/// connection is opened on `start` or on the first send.
pub struct WebSocketClientEndpoint {
    config: WebSocketClientConfig,
    base: BaseEndpoint,
    sink: Mutex<Option<WsSink>>,
    inbound: Arc<MessageQueue>,
}

impl WebSocketClientEndpoint {
    pub fn new(config: WebSocketClientConfig) -> Self {
        Self {
            base: BaseEndpoint::new(&config.name),
            inbound: Arc::new(MessageQueue::new(config.name.clone())),
            sink: Mutex::new(None),
            config,
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn connect(&self) -> CitrusResult<()> {
        let (stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| CitrusError::endpoint(&self.config.name, format!("failed to connect to {}: {}", self.config.url, e)))?;
        let (sink, mut reader) = stream.split();
        *self.sink.lock().await = Some(sink);

        let mut shutdown_rx = self.base.create_shutdown_channel().await;
        let inbound = Arc::clone(&self.inbound);
        let name = self.config.name.clone();
        let url = self.config.url.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(endpoint = %name, "Shutdown signal received");
                        break;
                    }
                    frame = reader.next() => {
                        match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                inbound.push(Message::new(text.as_str()).with_header(headers::ENDPOINT_URI, &url));
                            }
                            Some(Ok(WsMessage::Binary(data))) => {
                                inbound.push(
                                    Message::new(String::from_utf8_lossy(&data).into_owned())
                                        .with_header(headers::ENDPOINT_URI, &url),
                                );
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!(endpoint = %name, "WebSocket connection closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!(endpoint = %name, error = %e, "WebSocket error");
                                break;
                            }
                        }
                    }
                }
            }
        });
        self.base.set_task(handle).await;
        self.base.set_running(true);

        info!(endpoint = %self.config.name, url = %self.config.url, "WebSocket client connected");
        Ok(())
    }
}

#[async_trait]
impl Endpoint for WebSocketClientEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "websocket-client"
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

    async fn start(&self) -> CitrusResult<()> {
        if self.base.is_running() {
            return Ok(());
        }
        self.connect().await
    }

    async fn stop(&self) -> CitrusResult<()> {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        self.base.stop_task().await;
        Ok(())
    }

    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        if !self.base.is_running() {
            self.connect().await?;
        }

        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| CitrusError::endpoint(&self.config.name, "connection is not open"))?;
        sink.send(WsMessage::Text(message.payload.into())).await?;
        debug!(endpoint = %self.config.name, "WebSocket message sent");
        Ok(())
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        if !self.base.is_running() {
            self.connect().await?;
        }

        self.inbound
            .receive(selector, timeout)
            .await
            .ok_or_else(|| CitrusError::timeout(&self.config.name, timeout))
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.inbound.purge(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let WsMessage::Text(text) = frame {
                    let reply = format!("echo: {}", text.as_str());
                    ws.send(WsMessage::Text(reply.into())).await.unwrap();
                }
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_send_and_receive_frames() {
        let url = echo_server().await;
        let endpoint = WebSocketClientEndpoint::new(WebSocketClientConfig {
            name: "socket".to_string(),
            url,
            timeout: 1000,
            auto_start: false,
        });
        let context = TestContext::new();

        endpoint.send(Message::new("hello"), &context).await.unwrap();
        let reply = endpoint
            .receive(None, Duration::from_secs(2), &context)
            .await
            .unwrap();
        assert_eq!(reply.payload, "echo: hello");
        assert!(endpoint.is_running());

        endpoint.stop().await.unwrap();
        assert!(!endpoint.is_running());
    }
}
