//! Unit tests for the test event bus

use std::time::Duration;
use tokio::time::timeout;

use crate::testcase::{EventBus, TestEvent, TestEventKind};

#[tokio::test]
async fn test_event_bus_publish_subscribe() {
    let bus = EventBus::new(100);
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();

    let event = TestEvent::new(
        TestEventKind::TestStarted,
        "order-test",
        serde_json::json!({"author": "Christoph"}),
    );
    let receivers = bus.publish(event).await;
    assert_eq!(receivers, 2);

    let received1 = timeout(Duration::from_secs(1), rx1.recv()).await.unwrap().unwrap();
    let received2 = timeout(Duration::from_secs(1), rx2.recv()).await.unwrap().unwrap();
    assert_eq!(received1.source, "order-test");
    assert_eq!(received1.kind, TestEventKind::TestStarted);
    assert_eq!(received2.id, received1.id);

    let stats = bus.get_stats().await;
    assert_eq!(stats.events_published, 1);
    assert_eq!(*stats.kind_counts.get("test_started").unwrap(), 1);
}

#[tokio::test]
async fn test_event_bus_without_subscribers() {
    let bus = EventBus::new(10);
    assert_eq!(bus.subscriber_count(), 0);

    let receivers = bus
        .publish(TestEvent::new(TestEventKind::SuiteStarted, "suite", serde_json::Value::Null))
        .await;
    assert_eq!(receivers, 0);

    let stats = bus.get_stats().await;
    assert_eq!(stats.events_published, 0);
    assert_eq!(stats.events_dropped, 1);

    bus.reset_stats().await;
    assert_eq!(bus.get_stats().await.events_dropped, 0);
}

#[tokio::test]
async fn test_event_bus_clone_shares_channel() {
    let bus = EventBus::new(10);
    let clone = bus.clone();
    let mut rx = bus.subscribe();

    clone
        .publish(TestEvent::new(TestEventKind::TestFinished, "t", serde_json::json!({"status": "success"})))
        .await;

    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.payload["status"], "success");
    assert_eq!(bus.get_stats().await.events_published, 1);
    assert_eq!(clone.capacity(), 10);
}
