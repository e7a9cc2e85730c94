use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, trace};

/// Default capacity of the test event channel
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Lifecycle stage a test event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestEventKind {
    SuiteStarted,
    TestStarted,
    ActionStarted,
    ActionFinished,
    TestFinished,
    SuiteFinished,
}

impl std::fmt::Display for TestEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TestEventKind::SuiteStarted => "suite_started",
            TestEventKind::TestStarted => "test_started",
            TestEventKind::ActionStarted => "action_started",
            TestEventKind::ActionFinished => "action_finished",
            TestEventKind::TestFinished => "test_finished",
            TestEventKind::SuiteFinished => "suite_finished",
        };
        write!(f, "{}", text)
    }
}

/// Event published while a suite runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEvent {
    pub id: String,
    pub kind: TestEventKind,
    /// Suite or test name
    pub source: String,
    /// Details such as action name or test status
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TestEvent {
    pub fn new(kind: TestEventKind, source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source: source.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Statistics about event bus activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Number of events delivered to at least one subscriber
    pub events_published: u64,
    /// Number of events nobody listened to
    pub events_dropped: u64,
    /// Count of events by kind
    pub kind_counts: HashMap<String, u64>,
}

/// Broadcasts test lifecycle events to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<TestEvent>,
    capacity: usize,
    stats: Arc<RwLock<EventBusStats>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Creating test event bus");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        trace!("New subscriber registered to test event bus");
        self.sender.subscribe()
    }

    /// Publish an event, returns the number of subscribers reached
    pub async fn publish(&self, event: TestEvent) -> usize {
        let kind = event.kind.to_string();
        trace!(kind = %kind, source = %event.source, "Publishing test event");

        let mut stats = self.stats.write().await;
        *stats.kind_counts.entry(kind).or_insert(0) += 1;
        match self.sender.send(event) {
            Ok(receivers) => {
                stats.events_published += 1;
                receivers
            }
            Err(_) => {
                // no subscribers
                stats.events_dropped += 1;
                0
            }
        }
    }

    pub async fn get_stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.write().await = EventBusStats::default();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
            stats: Arc::clone(&self.stats),
        }
    }
}
