use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Message, MessageSelector};

/// In-memory message queue with selective, time-bounded receive
#[derive(Debug)]
pub struct MessageQueue {
    name: String,
    messages: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a message and wake up waiting consumers
    pub fn push(&self, message: Message) {
        trace!(queue = %self.name, message_id = %message.id, "Message added to queue");
        self.lock().push_back(message);
        self.notify.notify_waiters();
    }

    /// Remove the first message matching the selector, if any
    pub fn try_receive(&self, selector: Option<&MessageSelector>) -> Option<Message> {
        let mut messages = self.lock();
        let position = match selector {
            Some(selector) if !selector.is_empty() => {
                messages.iter().position(|message| selector.matches(message))
            }
            _ => (!messages.is_empty()).then_some(0),
        };
        position.and_then(|index| messages.remove(index))
    }

    /// Wait for a matching message until the timeout elapses
    pub async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
    ) -> Option<Message> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_receive(selector) {
                return Some(message);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                debug!(queue = %self.name, ?timeout, "No message received before timeout");
                return None;
            }
        }
    }

    /// Remove the message with the given id, returns whether it was queued
    pub fn remove(&self, message_id: &str) -> bool {
        let mut messages = self.lock();
        match messages.iter().position(|message| message.id == message_id) {
            Some(index) => messages.remove(index).is_some(),
            None => false,
        }
    }

    /// Remove all messages matching the selector, returns the number removed
    pub fn purge(&self, selector: Option<&MessageSelector>) -> usize {
        let mut messages = self.lock();
        let before = messages.len();
        match selector {
            Some(selector) if !selector.is_empty() => {
                messages.retain(|message| !selector.matches(message))
            }
            _ => messages.clear(),
        }
        let removed = before - messages.len();
        debug!(queue = %self.name, removed, "Purged messages");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        // a poisoned queue still holds consistent data
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_receive_waits_for_message() {
        let queue = Arc::new(MessageQueue::new("test"));
        let producer = Arc::clone(&queue);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer.push(Message::new("Hello"));
        });

        let message = queue.receive(None, Duration::from_secs(2)).await.unwrap();
        assert_eq!(message.payload, "Hello");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_receive_with_selector_and_timeout() {
        let queue = MessageQueue::new("test");
        queue.push(Message::new("first").with_header("type", "a"));
        queue.push(Message::new("second").with_header("type", "b"));

        let selector = MessageSelector::parse("type = 'b'").unwrap();
        let message = queue.receive(Some(&selector), Duration::from_millis(100)).await.unwrap();
        assert_eq!(message.payload, "second");

        let none = queue.receive(Some(&selector), Duration::from_millis(50)).await;
        assert!(none.is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.purge(None), 1);
    }
}
