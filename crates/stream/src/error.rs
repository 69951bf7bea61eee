// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from stdin fan-in (§4.5).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("stdin pipe is full")]
    WouldBlock,
    #[error("stdin pipe is closed")]
    Closed,
}
