//! Event bus replay, termination and delivery guarantees

use futures::StreamExt;
use incident_events::{EventBus, EventType};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready};

fn messages(events: &[std::sync::Arc<incident_events::Event>]) -> Vec<String> {
    events.iter().map(|event| event.message.clone()).collect()
}

#[tokio::test]
async fn late_subscriber_replays_then_blocks() {
    let bus = EventBus::new();
    for message in ["E1", "E2", "E3"] {
        bus.emit("S", EventType::Received, json!({}), message);
    }

    let mut sub = bus.subscribe("S");
    let mut replayed = Vec::new();
    for _ in 0..3 {
        replayed.push(sub.recv().await.unwrap());
    }
    assert_eq!(messages(&replayed), vec!["E1", "E2", "E3"]);

    let mut next = tokio_test::task::spawn(sub.recv());
    assert_pending!(next.poll());

    bus.emit("S", EventType::Enriching, json!({}), "E4");
    assert!(next.is_woken());
    let live = assert_ready!(next.poll()).unwrap();
    assert_eq!(live.message, "E4");
    assert_eq!(live.sequence, 4);
}

#[tokio::test]
async fn stream_ends_at_terminal_event() {
    let bus = EventBus::new();
    let sub = bus.subscribe("S");

    bus.emit("S", EventType::Received, json!({}), "received");
    bus.emit("S", EventType::Resolved, json!({}), "resolved");
    bus.emit("S", EventType::Escalating, json!({}), "after terminal");

    let events = sub.collect_all().await;
    assert_eq!(messages(&events), vec!["received", "resolved"]);
    assert_eq!(bus.subscriber_count("S"), 0);
}

#[tokio::test]
async fn future_subscribers_stop_at_terminal_in_history() {
    let bus = EventBus::new();
    bus.emit("S", EventType::Received, json!({}), "received");
    bus.emit("S", EventType::HumanTakeover, json!({}), "takeover");

    let events = bus.subscribe("S").collect_all().await;
    assert_eq!(messages(&events), vec!["received", "takeover"]);
    assert_eq!(bus.subscriber_count("S"), 0);
}

#[tokio::test]
async fn close_releases_waiting_subscriber() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe("S");
    bus.emit("S", EventType::Received, json!({}), "queued");

    let waiter = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(event) = sub.recv().await {
            seen.push(event.message.clone());
        }
        seen
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.close("S");

    let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("subscriber hung after close")
        .unwrap();
    assert_eq!(seen, vec!["queued"]);
}

#[tokio::test]
async fn subscribing_after_close_replays_and_ends() {
    let bus = EventBus::new();
    bus.emit("S", EventType::Received, json!({}), "one");
    bus.emit("S", EventType::Enriching, json!({}), "two");
    bus.close("S");

    let events = tokio::time::timeout(Duration::from_secs(1), bus.subscribe("S").collect_all())
        .await
        .unwrap();
    assert_eq!(messages(&events), vec!["one", "two"]);
}

#[tokio::test]
async fn full_queue_drops_for_slow_subscriber_only() {
    let bus = EventBus::with_capacity(2);
    let slow = bus.subscribe("S");

    for i in 0..5 {
        bus.emit("S", EventType::RemediationAttempted, json!({ "i": i }), format!("E{i}"));
    }
    let fast = bus.subscribe("S");
    bus.close("S");

    let slow_events = slow.collect_all().await;
    assert_eq!(messages(&slow_events), vec!["E0", "E1"]);

    let replayed = fast.collect_all().await;
    assert_eq!(replayed.len(), 5);

    let stats = bus.stats();
    assert_eq!(stats.events_emitted, 5);
    assert_eq!(stats.events_dropped, 3);
}

#[tokio::test]
async fn slow_subscriber_ends_when_terminal_event_is_dropped() {
    let bus = EventBus::with_capacity(1);
    let sub = bus.subscribe("S");

    bus.emit("S", EventType::Received, json!({}), "received");
    bus.emit("S", EventType::Resolved, json!({}), "resolved");
    assert_eq!(bus.stats().events_dropped, 1);
    assert_eq!(bus.subscriber_count("S"), 0);
    assert!(!bus.is_closed("S"));

    let events = tokio::time::timeout(Duration::from_millis(500), sub.collect_all())
        .await
        .expect("subscriber hung after terminal event");
    assert_eq!(messages(&events), vec!["received"]);

    // History still carries the terminal event for replay
    let replayed = bus.subscribe("S").collect_all().await;
    assert_eq!(messages(&replayed), vec!["received", "resolved"]);
}

#[tokio::test]
async fn dropping_subscription_deregisters() {
    let bus = EventBus::new();
    let first = bus.subscribe("S");
    let _second = bus.subscribe("S");
    assert_eq!(bus.subscriber_count("S"), 2);

    drop(first);
    assert_eq!(bus.subscriber_count("S"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribe_never_loses_or_duplicates() {
    const TOTAL: u64 = 300;
    let bus = EventBus::with_capacity(1024);

    let publisher = {
        let bus = bus.clone();
        tokio::spawn(async move {
            for i in 1..TOTAL {
                bus.emit("S", EventType::RemediationAttempted, json!({ "i": i }), "step");
                if i % 25 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            bus.emit("S", EventType::Resolved, json!({}), "done");
        })
    };

    let mut readers = Vec::new();
    for delay in [0_u64, 1, 2, 5] {
        let bus = bus.clone();
        readers.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            bus.subscribe("S")
                .map(|event| event.sequence)
                .collect::<Vec<_>>()
                .await
        }));
    }

    publisher.await.unwrap();
    let expected: Vec<u64> = (1..=TOTAL).collect();
    for reader in readers {
        let sequences = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sequences, expected);
    }
}

#[tokio::test]
async fn sessions_are_isolated() {
    let bus = EventBus::new();
    let sub_a = bus.subscribe("A");
    bus.emit("B", EventType::Received, json!({}), "for B");
    bus.emit("A", EventType::Error, json!({ "error": "boom" }), "for A");

    let events = sub_a.collect_all().await;
    assert_eq!(messages(&events), vec!["for A"]);
    assert_eq!(events[0].field("error"), Some(&json!("boom")));
}
