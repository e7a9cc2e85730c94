//! Request/reply bookkeeping shared by server endpoints.
//!
//! Inbound requests are queued for the test to receive. The server side waits
//! for the reply the test sends next; replies go to the oldest request the
//! test has received and not answered yet.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{CitrusError, CitrusResult};
use crate::message::{Message, MessageQueue, MessageSelector};

pub struct ServerExchange {
    name: String,
    inbound: MessageQueue,
    pending: DashMap<String, oneshot::Sender<Message>>,
    /// Ids of received requests waiting for a reply
    received: Mutex<VecDeque<String>>,
}

impl ServerExchange {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inbound: MessageQueue::new(name.clone()),
            name,
            pending: DashMap::new(),
            received: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an inbound request and wait for the reply.
    ///
    /// Returns `None` when no reply is sent within the timeout.
    pub async fn handle(&self, request: Message, timeout: Duration) -> Option<Message> {
        let request_id = request.id.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), reply_tx);

        debug!(endpoint = %self.name, request_id = %request_id, "Received inbound request");
        self.inbound.push(request);

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Some(reply),
            _ => {
                warn!(endpoint = %self.name, request_id = %request_id, ?timeout, "No reply for inbound request");
                self.pending.remove(&request_id);
                self.inbound.remove(&request_id);
                self.lock().retain(|id| id != &request_id);
                None
            }
        }
    }

    /// Queue an inbound message that expects no reply
    pub fn enqueue(&self, message: Message) {
        debug!(endpoint = %self.name, message_id = %message.id, "Received inbound message");
        self.inbound.push(message);
    }

    /// Receive the next inbound request
    pub async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
    ) -> CitrusResult<Message> {
        let message = self
            .inbound
            .receive(selector, timeout)
            .await
            .ok_or_else(|| CitrusError::timeout(&self.name, timeout))?;

        if self.pending.contains_key(&message.id) {
            self.lock().push_back(message.id.clone());
        }
        Ok(message)
    }

    /// Send a reply to the oldest received request that is still waiting
    pub fn reply(&self, message: Message) -> CitrusResult<()> {
        let mut message = message;
        loop {
            let request_id = self.lock().pop_front().ok_or_else(|| {
                CitrusError::endpoint(&self.name, "No received request to send the reply to")
            })?;

            let Some((_, sender)) = self.pending.remove(&request_id) else {
                continue;
            };

            match sender.send(message) {
                Ok(()) => {
                    debug!(endpoint = %self.name, request_id = %request_id, "Reply sent");
                    return Ok(());
                }
                // request timed out in between, try the next one
                Err(returned) => message = returned,
            }
        }
    }

    pub fn purge(&self, selector: Option<&MessageSelector>) -> usize {
        self.inbound.purge(selector)
    }

    /// Requests waiting for a reply, received by the test or not
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.received.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reply_to_waiting_request() {
        let exchange = Arc::new(ServerExchange::new("server"));

        let server = Arc::clone(&exchange);
        let handler = tokio::spawn(async move {
            server
                .handle(Message::new("ping"), Duration::from_secs(2))
                .await
        });

        let request = exchange.receive(None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(request.payload, "ping");
        exchange.reply(Message::new("pong")).unwrap();

        let reply = handler.await.unwrap().unwrap();
        assert_eq!(reply.payload, "pong");
        assert_eq!(exchange.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_reply_without_request() {
        let exchange = ServerExchange::new("server");
        assert!(exchange.reply(Message::new("pong")).is_err());
    }

    #[tokio::test]
    async fn test_handle_times_out() {
        let exchange = ServerExchange::new("server");
        let reply = exchange
            .handle(Message::new("ping"), Duration::from_millis(20))
            .await;
        assert!(reply.is_none());
        assert_eq!(exchange.pending_requests(), 0);

        // the timed out request is no longer handed to the test
        assert!(exchange.receive(None, Duration::from_millis(20)).await.is_err());
    }

    #[tokio::test]
    async fn test_reply_goes_to_selected_request() {
        let exchange = Arc::new(ServerExchange::new("server"));

        let first = Arc::clone(&exchange);
        let first = tokio::spawn(async move {
            first
                .handle(Message::new("a").with_header("operation", "a"), Duration::from_secs(2))
                .await
        });
        let second = Arc::clone(&exchange);
        let second = tokio::spawn(async move {
            second
                .handle(Message::new("b").with_header("operation", "b"), Duration::from_secs(2))
                .await
        });

        let selector = MessageSelector::parse("operation = 'b'").unwrap();
        let request = exchange
            .receive(Some(&selector), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(request.payload, "b");
        exchange.reply(Message::new("reply-b")).unwrap();
        assert_eq!(second.await.unwrap().unwrap().payload, "reply-b");

        let request = exchange.receive(None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(request.payload, "a");
        exchange.reply(Message::new("reply-a")).unwrap();
        assert_eq!(first.await.unwrap().unwrap().payload, "reply-a");
    }

    #[tokio::test]
    async fn test_reply_requires_received_request() {
        let exchange = Arc::new(ServerExchange::new("server"));
        let server = Arc::clone(&exchange);
        let handler = tokio::spawn(async move {
            server
                .handle(Message::new("ping"), Duration::from_millis(200))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exchange.pending_requests(), 1);
        assert!(exchange.reply(Message::new("pong")).is_err());
        assert!(handler.await.unwrap().is_none());
    }
}
