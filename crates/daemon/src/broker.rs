// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broker: persist every event, fan out live, replay on demand.
//!
//! Each subscriber owns a bounded queue drained by its own consumer
//! (the SSE handler task), so a slow client sheds its own oldest
//! events and never blocks publishers.

use coven_core::{Clock, Event, EventKind};
use coven_store::{Store, StoreError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Heartbeat cadence so clients can detect dead connections.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Per-subscriber queue capacity before shedding starts.
const SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberQueue {
    events: VecDeque<Event>,
    /// Set once per overflow burst so the client knows to re-snapshot
    overflowed: bool,
}

struct Subscriber {
    queue: Arc<Mutex<SubscriberQueue>>,
    notify: Arc<Notify>,
}

/// The process-wide publish/subscribe hub.
pub struct Broker<C: Clock> {
    store: Arc<Store>,
    clock: C,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl<C: Clock> Broker<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self { store, clock, subscribers: Mutex::new(Vec::new()) }
    }

    /// Persist an event and deliver it to every live subscriber.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.store.append_event(&event) {
            // A write failure here is a store failure; surface loudly but
            // keep fan-out alive so clients still see the event.
            tracing::error!(error = %e, kind = %event.kind, "failed to persist event");
        }

        let mut subscribers = self.subscribers.lock();
        // Prune subscribers whose consumer side is gone.
        subscribers.retain(|s| Arc::strong_count(&s.queue) > 1);
        for subscriber in subscribers.iter() {
            let mut queue = subscriber.queue.lock();
            if queue.events.len() >= SUBSCRIBER_CAPACITY {
                shed_oldest(&mut queue, self.clock.epoch_ms());
            }
            queue.events.push_back(event.clone());
            drop(queue);
            subscriber.notify.notify_one();
        }
    }

    /// Subscribe, replaying persisted events after `since_ms` first.
    pub fn subscribe(&self, since_ms: u64) -> Result<Subscription, StoreError> {
        let replay = self.store.events_since(since_ms)?;
        let queue = Arc::new(Mutex::new(SubscriberQueue {
            events: replay.into(),
            overflowed: false,
        }));
        let notify = Arc::new(Notify::new());
        self.subscribers
            .lock()
            .push(Subscriber { queue: Arc::clone(&queue), notify: Arc::clone(&notify) });
        Ok(Subscription { queue, notify })
    }

    /// Emit the periodic heartbeat until cancelled.
    pub async fn heartbeat_loop(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
                _ = cancel.cancelled() => return,
            }
            self.publish(Event::new(EventKind::Heartbeat, "covend", self.clock.epoch_ms()));
        }
    }
}

/// Drop the oldest sheddable event; lifecycle events survive as long as
/// anything else can go. Marks the queue overflowed with an inline
/// `broker.overflow` event (once per burst).
fn shed_oldest(queue: &mut SubscriberQueue, now_ms: u64) {
    let dropped = match queue.events.iter().position(|e| !e.kind.is_critical()) {
        Some(index) => queue.events.remove(index),
        None => queue.events.pop_front(),
    };
    if dropped.is_some() && !queue.overflowed {
        queue.overflowed = true;
        queue
            .events
            .push_front(Event::new(EventKind::BrokerOverflow, "covend", now_ms));
    }
}

/// A live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    queue: Arc<Mutex<SubscriberQueue>>,
    notify: Arc<Notify>,
}

impl Subscription {
    /// Next event, in order; waits for publishers when drained.
    pub async fn next(&mut self) -> Event {
        loop {
            {
                let mut queue = self.queue.lock();
                if let Some(event) = queue.events.pop_front() {
                    if queue.events.is_empty() {
                        queue.overflowed = false;
                    }
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking pop, for tests and draining.
    pub fn try_next(&mut self) -> Option<Event> {
        let mut queue = self.queue.lock();
        let event = queue.events.pop_front();
        if queue.events.is_empty() {
            queue.overflowed = false;
        }
        event
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
