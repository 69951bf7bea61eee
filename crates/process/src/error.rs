// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from the OS-facing process adapter (§7 `SpawnError`).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("process {0} not found")]
    NotFound(u32),

    #[error("invalid signal number {0}")]
    InvalidSignal(i32),

    #[error("signal delivery failed: {0}")]
    SignalFailed(#[source] std::io::Error),

    #[error("failed to read stats for pid {pid}: {source}")]
    StatsUnavailable {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
