// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer wheel for deferred flapping retries and graceful-shutdown
//! escalation (§4.3, §4.4, §5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a fired timer was for, so the Loop knows which handler to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Re-attempt a spawn after a flapping-deferred retry delay.
    FlappingRetry { template: String },
    /// Escalate a `TERMINATING` instance to a forced kill.
    GracefulTimeout { instance: u64 },
    /// Force-release an instance that ignored the forced kill grace period.
    ForcedKillGrace { instance: u64 },
}

#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
    kind: TimerKind,
}

/// Manages all deferred work for the Manager loop.
///
/// Timers are keyed by an opaque string id so callers can cancel by exact
/// id or by prefix (e.g. cancelling every timer for an instance at once).
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<String, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timer(&mut self, id: String, duration: Duration, now: Instant, kind: TimerKind) {
        self.timers.insert(
            id,
            Timer {
                fires_at: now + duration,
                kind,
            },
        );
    }

    pub fn cancel_timer(&mut self, id: &str) {
        self.timers.remove(id);
    }

    pub fn cancel_timers_with_prefix(&mut self, prefix: &str) {
        self.timers.retain(|id, _| !id.starts_with(prefix));
    }

    /// Pop every timer that has fired by `now`, oldest-registered first tie
    /// broken by id for determinism in tests.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(String, Timer)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at <= now)
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect();
        due.sort_by(|a, b| a.1.fires_at.cmp(&b.1.fires_at).then_with(|| a.0.cmp(&b.0)));
        for (id, _) in &due {
            self.timers.remove(id);
        }
        due.into_iter().map(|(_, t)| t.kind).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

/// Timer id for a template's deferred flapping retry.
pub fn flapping_retry_timer_id(template: &str) -> String {
    format!("flapping_retry:{template}")
}

/// Timer id for an instance's graceful-timeout escalation.
pub fn graceful_timeout_timer_id(instance: u64) -> String {
    format!("{}graceful_timeout", instance_timer_prefix(instance))
}

/// Timer id for an instance's forced-kill grace period.
pub fn forced_kill_grace_timer_id(instance: u64) -> String {
    format!("{}forced_kill_grace", instance_timer_prefix(instance))
}

/// Prefix covering every timer that belongs to one instance, for cleanup
/// on `exit` (§5: "all timers associated with a terminated instance are
/// released at exit").
pub fn instance_timer_prefix(instance: u64) -> String {
    format!("inst:{instance}:")
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
