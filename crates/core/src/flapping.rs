// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-template crash-rate ("flapping") detector (§3 FlappingWindow, §4.3).
//!
//! Pure policy logic: no timers, no I/O. `procd-supervisor::flapping_detector`
//! wires this to the Scheduler to actually defer spawns and emit events.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::template::FlappingPolicy;

/// Runtime state of the detector for one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Not currently flapping.
    Normal,
    /// Tripped at least once; spawns are being deferred.
    Retrying,
    /// Retries exhausted; the template is marked stopped (§4.3).
    Stopped,
}

/// Result of recording an unexpected exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlappingOutcome {
    /// No flapping detected; proceed with normal convergence.
    Ok,
    /// The detector (re)tripped; defer the next spawn by `after`.
    Retrying { after: Duration, retry_number: u32 },
    /// Retries exhausted on this trip cycle; the template is now stopped.
    /// Returned exactly once per trip cycle (§8 invariant).
    StoppedFlapping,
    /// The detector is already in the `Stopped` state from an earlier trip
    /// cycle; this exit is a no-op until the template is explicitly reset.
    AlreadyStopped,
}

/// Sliding-window crash-rate counter for a single template (§3, §4.3).
#[derive(Debug, Clone)]
pub struct FlappingWindow {
    policy: FlappingPolicy,
    exit_timestamps: VecDeque<Instant>,
    retry_count: u32,
    state: State,
}

impl FlappingWindow {
    pub fn new(policy: FlappingPolicy) -> Self {
        Self {
            policy,
            exit_timestamps: VecDeque::new(),
            retry_count: 0,
            state: State::Normal,
        }
    }

    pub fn policy(&self) -> &FlappingPolicy {
        &self.policy
    }

    pub fn is_stopped(&self) -> bool {
        self.state == State::Stopped
    }

    pub fn is_retrying(&self) -> bool {
        self.state == State::Retrying
    }

    fn prune(&mut self, now: Instant) {
        let window = self.policy.window;
        while let Some(&front) = self.exit_timestamps.front() {
            if now.saturating_duration_since(front) > window {
                self.exit_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record an unexpected exit (§4.3 defines what counts as unexpected).
    /// A disabled policy (`attempts == 0`) never trips.
    pub fn record_unexpected_exit(&mut self, now: Instant) -> FlappingOutcome {
        if self.policy.disabled() {
            return FlappingOutcome::Ok;
        }
        if self.state == State::Stopped {
            return FlappingOutcome::AlreadyStopped;
        }

        self.prune(now);
        self.exit_timestamps.push_back(now);

        if self.state == State::Retrying {
            self.retry_count += 1;
            if self.retry_count >= self.policy.max_retry {
                self.state = State::Stopped;
                return FlappingOutcome::StoppedFlapping;
            }
            return FlappingOutcome::Retrying {
                after: self.policy.retry_in,
                retry_number: self.retry_count,
            };
        }

        if self.exit_timestamps.len() as u32 >= self.policy.attempts {
            self.state = State::Retrying;
            self.retry_count = 0;
            return FlappingOutcome::Retrying {
                after: self.policy.retry_in,
                retry_number: 0,
            };
        }

        FlappingOutcome::Ok
    }

    /// An instance survived longer than `window`; reset the failure counter
    /// (§4.3: "Any instance that stays alive longer than window resets the
    /// failure counter").
    pub fn record_long_lived(&mut self) {
        self.exit_timestamps.clear();
        self.retry_count = 0;
        self.state = State::Normal;
    }

    /// Explicit reset, e.g. on `start`/`reload` (§4.1), independent of uptime.
    pub fn reset(&mut self) {
        self.record_long_lived();
    }
}

#[cfg(test)]
#[path = "flapping_tests.rs"]
mod tests;
