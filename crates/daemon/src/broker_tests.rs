// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::FakeClock;
use tempfile::TempDir;

fn broker(dir: &TempDir) -> Broker<FakeClock> {
    let store = Arc::new(Store::open(dir.path().join("coven.db")).unwrap());
    Broker::new(store, FakeClock::new())
}

fn event(kind: EventKind, entity: &str, ts: u64) -> Event {
    Event::new(kind, entity, ts)
}

#[tokio::test]
async fn publish_persists_and_delivers() {
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);
    let mut sub = broker.subscribe(0).unwrap();

    broker.publish(event(EventKind::WorkflowStarted, "task-1", 100));

    let received = sub.next().await;
    assert_eq!(received.kind, EventKind::WorkflowStarted);
    assert_eq!(received.entity, "task-1");
}

#[tokio::test]
async fn reconnect_replays_exactly_the_missed_events() {
    // S6 shape: disconnect after t1, miss k events, reconnect with
    // lastEventId=t1 and receive exactly those k in order.
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);

    broker.publish(event(EventKind::WorkflowStarted, "task-1", 100));
    for (i, ts) in [(1u64, 200u64), (2, 300), (3, 400)] {
        broker.publish(
            event(EventKind::WorkflowStepCompleted, "task-1", ts)
                .with_payload(serde_json::json!({ "i": i }), 1024),
        );
    }

    let mut sub = broker.subscribe(100).unwrap();
    let mut replayed = Vec::new();
    while let Some(event) = sub.try_next() {
        replayed.push(event);
    }
    assert_eq!(replayed.len(), 3);
    let times: Vec<u64> = replayed.iter().map(|e| e.ts_ms).collect();
    assert_eq!(times, vec![200, 300, 400]);

    // Live events follow the replay.
    broker.publish(event(EventKind::WorkflowCompleted, "task-1", 500));
    assert_eq!(sub.next().await.kind, EventKind::WorkflowCompleted);
}

#[tokio::test]
async fn slow_subscriber_sheds_oldest_and_flags_overflow() {
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);
    let mut sub = broker.subscribe(0).unwrap();

    // Push well past the queue capacity without draining.
    for i in 0..400u64 {
        broker.publish(event(EventKind::AgentOutput, "task-1", i));
    }

    let mut seen = Vec::new();
    while let Some(event) = sub.try_next() {
        seen.push(event);
    }
    // The overflow marker surfaces first so the client re-snapshots.
    assert_eq!(seen.first().map(|e| e.kind), Some(EventKind::BrokerOverflow));
    // The oldest events are gone, the newest survived.
    assert_eq!(seen.last().map(|e| e.ts_ms), Some(399));
    assert!(seen.len() < 400);
}

#[tokio::test]
async fn overflow_prefers_shedding_non_critical_events() {
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);
    let mut sub = broker.subscribe(0).unwrap();

    broker.publish(event(EventKind::WorkflowStarted, "task-1", 1));
    for i in 0..300u64 {
        broker.publish(event(EventKind::AgentOutput, "task-1", 10 + i));
    }

    let mut seen = Vec::new();
    while let Some(event) = sub.try_next() {
        seen.push(event);
    }
    // The critical lifecycle event survived the shedding.
    assert!(seen.iter().any(|e| e.kind == EventKind::WorkflowStarted));
}

#[tokio::test]
async fn dropped_subscriptions_are_pruned() {
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);
    let sub = broker.subscribe(0).unwrap();
    drop(sub);

    // Publishing after the drop must not accumulate anywhere.
    broker.publish(event(EventKind::Heartbeat, "covend", 1));
    let mut sub = broker.subscribe(0).unwrap();
    // The event was still persisted, so a new subscriber replays it.
    assert_eq!(sub.try_next().map(|e| e.kind), Some(EventKind::Heartbeat));
}

#[tokio::test]
async fn events_persist_for_replay_across_subscribers() {
    let dir = TempDir::new().unwrap();
    let broker = broker(&dir);
    broker.publish(event(EventKind::QuestionsAsked, "qst-1", 50));

    let mut sub = broker.subscribe(0).unwrap();
    let replayed = sub.try_next().unwrap();
    assert_eq!(replayed.kind, EventKind::QuestionsAsked);
    assert_eq!(replayed.entity, "qst-1");
}
