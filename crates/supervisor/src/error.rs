// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager error kinds (§7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid spec field '{field}': {reason}")]
    InvalidSpec { field: String, reason: String },
    #[error("invalid state for this operation: {0}")]
    InvalidState(String),
    #[error("spawn failed: {0}")]
    SpawnError(String),
    #[error("graceful termination timed out")]
    TerminateTimeout,
    #[error("template is flapping (retrying or stopped)")]
    Flapping,
    #[error("subscriber queue overflow: {0}")]
    BackpressureDropped(String),
    #[error("manager loop is not running")]
    LoopGone,
}
