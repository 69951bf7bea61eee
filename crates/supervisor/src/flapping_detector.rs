// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires [`procd_core::FlappingWindow`]'s policy decisions to the
//! [`crate::scheduler::Scheduler`]'s deferred-retry timers (§4.3).

use std::time::Instant;

use procd_core::FlappingOutcome;

use crate::registry::TemplateEntry;
use crate::scheduler::{flapping_retry_timer_id, Scheduler, TimerKind};

/// What the Manager loop should do in response to an unexpected exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlappingAction {
    /// No policy configured, or the instance exited expectedly elsewhere:
    /// spawn a replacement immediately.
    SpawnNow,
    /// The detector tripped or is still retrying; a timer has been armed
    /// to re-attempt the spawn after the policy's `retry_in`.
    Deferred,
    /// Retries are exhausted; the template is now stopped. The caller
    /// should emit `stopped_flapping` exactly once.
    StoppedFlapping,
    /// The template was already stopped by a prior trip; no new event.
    AlreadyStopped,
}

/// Record one unexpected exit for `template` and decide what happens next.
pub fn record_unexpected_exit(
    template: &mut TemplateEntry,
    scheduler: &mut Scheduler,
    now: Instant,
) -> FlappingAction {
    match template.flapping.record_unexpected_exit(now) {
        FlappingOutcome::Ok => FlappingAction::SpawnNow,
        FlappingOutcome::Retrying { after, .. } => {
            scheduler.set_timer(
                flapping_retry_timer_id(&template.qualified_name),
                after,
                now,
                TimerKind::FlappingRetry {
                    template: template.qualified_name.clone(),
                },
            );
            FlappingAction::Deferred
        }
        FlappingOutcome::StoppedFlapping => FlappingAction::StoppedFlapping,
        FlappingOutcome::AlreadyStopped => FlappingAction::AlreadyStopped,
    }
}

#[cfg(test)]
#[path = "flapping_detector_tests.rs"]
mod tests;
