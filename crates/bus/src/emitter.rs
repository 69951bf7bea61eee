// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-tree pub/sub (§3 Subscription, §4.6).
//!
//! Publication never blocks the publisher: each subscriber owns a bounded
//! queue behind its own lock, and a full queue is handled per the
//! subscription's [`OverflowPolicy`] instead of backpressuring `publish`.
//! Subscribe/unsubscribe take the same lock `publish` iterates under, which
//! is what gives unsubscribe its "no event delivered after the call
//! returns" guarantee (§4.6).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use procd_core::Event;
use tokio::sync::Notify;

use crate::error::BusError;
use crate::topic::Pattern;

/// What a full subscriber queue does with the next event (§4.6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
    Disconnect,
}

/// One event as delivered to a specific subscriber, tagged with the topic
/// it matched (a subscriber's pattern may match more than one of an
/// event's published topics; it is still delivered at most once per event).
#[derive(Debug, Clone)]
pub struct Delivered {
    pub topic: String,
    pub event: Event,
}

struct SubscriberState {
    queue: VecDeque<Delivered>,
    notify: Arc<Notify>,
    disconnected: bool,
}

struct SubscriberEntry {
    id: u64,
    pattern: Pattern,
    policy: OverflowPolicy,
    capacity: usize,
    heartbeat: Option<Duration>,
    state: Arc<Mutex<SubscriberState>>,
}

struct Inner {
    subscribers: Vec<SubscriberEntry>,
}

/// Shared handle to the bus; cheap to clone, one instance per Manager.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<Mutex<Inner>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                subscribers: Vec::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a pattern subscription with a bounded per-subscriber queue.
    pub fn subscribe(
        &self,
        pattern: impl Into<Pattern>,
        capacity: usize,
        policy: OverflowPolicy,
        heartbeat: Option<Duration>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(Mutex::new(SubscriberState {
            queue: VecDeque::with_capacity(capacity.min(64)),
            notify: Arc::new(Notify::new()),
            disconnected: false,
        }));
        let pattern: Pattern = pattern.into();
        self.inner.lock().subscribers.push(SubscriberEntry {
            id,
            pattern: pattern.clone(),
            policy,
            capacity: capacity.max(1),
            heartbeat,
            state: Arc::clone(&state),
        });
        Subscription {
            id,
            pattern,
            heartbeat,
            state,
            emitter: self.clone(),
        }
    }

    /// Remove a subscription. Safe to call during a concurrent `publish`
    /// since both take the same lock; once this returns, no further event
    /// will be queued for `id` (§4.6).
    pub fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.retain(|s| s.id != id);
    }

    /// Publish an event to every topic it maps to (§4.6's canonical topic
    /// list via [`Event::topics`]). Never blocks; overflow is resolved per
    /// subscriber policy. Returns one error per subscriber that experienced
    /// backpressure or was disconnected.
    pub fn publish(&self, event: Event) -> Vec<BusError> {
        let topics = event.topics();
        let mut errors = Vec::new();
        let inner = self.inner.lock();
        for entry in &inner.subscribers {
            let matched = topics.iter().find(|t| entry.pattern.matches(t));
            let Some(topic) = matched else { continue };

            let mut state = entry.state.lock();
            if state.disconnected {
                continue;
            }
            if state.queue.len() >= entry.capacity {
                match entry.policy {
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                        state.queue.push_back(Delivered {
                            topic: topic.clone(),
                            event: event.clone(),
                        });
                        errors.push(BusError::BackpressureDropped {
                            subscription: entry.id,
                            policy: entry.policy,
                        });
                    }
                    OverflowPolicy::DropNewest => {
                        errors.push(BusError::BackpressureDropped {
                            subscription: entry.id,
                            policy: entry.policy,
                        });
                    }
                    OverflowPolicy::Disconnect => {
                        state.disconnected = true;
                        errors.push(BusError::Disconnected(entry.id));
                    }
                }
            } else {
                state.queue.push_back(Delivered {
                    topic: topic.clone(),
                    event: event.clone(),
                });
            }
            state.notify.notify_one();
        }
        errors
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Whether any live subscription's pattern matches `topic` (§4.4: the
    /// stats sampler only runs while this is true for a `stats.<pid>` topic).
    pub fn has_matching_subscriber(&self, topic: &str) -> bool {
        self.inner
            .lock()
            .subscribers
            .iter()
            .any(|s| s.pattern.matches(topic))
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    pattern: Pattern,
    heartbeat: Option<Duration>,
    state: Arc<Mutex<SubscriberState>>,
    emitter: EventEmitter,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat
    }

    /// Await the next delivered event, or `None` once disconnected. If a
    /// heartbeat interval is configured and nothing real arrives within
    /// it, synthesizes an `Event::Heartbeat` tagged with this
    /// subscription's own pattern instead of waiting forever (§4.5).
    pub async fn recv(&self) -> Option<Delivered> {
        loop {
            let notify = {
                let mut state = self.state.lock();
                if let Some(delivered) = state.queue.pop_front() {
                    return Some(delivered);
                }
                if state.disconnected {
                    return None;
                }
                Arc::clone(&state.notify)
            };
            match self.heartbeat {
                None => notify.notified().await,
                Some(interval) => {
                    tokio::select! {
                        _ = notify.notified() => {}
                        _ = tokio::time::sleep(interval) => {
                            let mut state = self.state.lock();
                            if let Some(delivered) = state.queue.pop_front() {
                                return Some(delivered);
                            }
                            if state.disconnected {
                                return None;
                            }
                            return Some(Delivered {
                                topic: self.pattern.to_string(),
                                event: Event::Heartbeat,
                            });
                        }
                    }
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.emitter.unsubscribe(self.id);
    }
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;
