// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process instance state machine (§4.4).
//!
//! `InstanceState` is the pure state; the OS-facing side (pipes, the actual
//! child handle) lives in `procd-process` and `procd-stream`. Keeping the
//! state machine here lets the Manager's convergence logic and tests reason
//! about transitions without touching real processes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::id::InstanceId;

/// How an instance reached `EXITED` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReapedKind {
    /// Process exited on its own; no stop was in flight.
    Normal,
    /// Process exited after a graceful stop signal, within the timeout.
    Graceful,
    /// The graceful timeout elapsed and the process was force-killed.
    Forced,
}

/// Exit status recorded when an instance transitions to `EXITED` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub exit_status: Option<i32>,
    pub term_signal: Option<i32>,
    pub reaped: ReapedKind,
}

/// The process instance state machine (§4.4).
///
/// `PENDING -> SPAWNING -> RUNNING -> (TERMINATING ->)? EXITED`, with
/// `SPAWNING -> SPAWN_FAILED` as the other terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Pending,
    Spawning,
    Running { os_pid: u32 },
    Terminating { os_pid: u32 },
    Exited(ExitStatus),
    SpawnFailed { message: String },
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Exited(_) | InstanceState::SpawnFailed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running { .. })
    }

    pub fn os_pid(&self) -> Option<u32> {
        match self {
            InstanceState::Running { os_pid } | InstanceState::Terminating { os_pid } => {
                Some(*os_pid)
            }
            _ => None,
        }
    }

    /// Short tag used in logs and protocol DTOs.
    pub fn tag(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Spawning => "spawning",
            InstanceState::Running { .. } => "running",
            InstanceState::Terminating { .. } => "terminating",
            InstanceState::Exited(_) => "exited",
            InstanceState::SpawnFailed { .. } => "spawn_failed",
        }
    }
}

/// Why a stop was requested, which determines whether the eventual exit
/// counts as "unexpected" for flapping purposes (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Explicit Manager action: stop/scale-down/unload/reload.
    Requested,
    /// No stop was requested; any exit is unexpected.
    None,
}

/// A live (or recently live) child process owned by a template (§3).
#[derive(Debug, Clone)]
pub struct ProcessInstance {
    pub id: InstanceId,
    pub template: String,
    pub state: InstanceState,
    pub stop_reason: StopReason,
    pub created_at: Instant,
    /// Set when a graceful stop is requested; used to detect whether an
    /// eventual zero-status exit happened within `graceful_timeout` (§4.3).
    pub stop_requested_at: Option<Instant>,
    /// True if this instance was spawned via `commit` (§4.1) and must never
    /// be auto-restarted by the reconciler or counted against `numprocesses`.
    pub unsupervised: bool,
}

impl ProcessInstance {
    pub fn new(id: InstanceId, template: String, created_at: Instant, unsupervised: bool) -> Self {
        Self {
            id,
            template,
            state: InstanceState::Pending,
            stop_reason: StopReason::None,
            created_at,
            stop_requested_at: None,
            unsupervised,
        }
    }

    /// Whether the eventual exit of this instance counts as *unexpected*
    /// for flapping purposes (§4.3): unexpected unless the instance was
    /// stopped by explicit Manager action, or exited with status 0 within
    /// `graceful_timeout` of such a request.
    pub fn is_unexpected_exit(&self, exit: &ExitStatus, graceful_timeout_elapsed: bool) -> bool {
        match self.stop_reason {
            StopReason::None => true,
            StopReason::Requested => {
                let clean = exit.exit_status == Some(0);
                !(clean && !graceful_timeout_elapsed)
            }
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
