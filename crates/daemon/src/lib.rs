// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Wires the Manager, the stream multiplexer, and the event bus into a
//! running process, and exposes them over a minimal internal Unix-socket
//! protocol used by the workspace's own integration tests (§6).
//!
//! This is not the HTTP/WS transport `spec.md` §6 describes — that remains
//! an external collaborator binding to `procd-protocol`'s DTOs. `main.rs`
//! is the `procd` binary entrypoint; everything else here is importable so
//! integration tests can start a daemon in-process.

pub mod config;
pub mod lifecycle;
pub mod listener;

pub use config::Config;
pub use lifecycle::Daemon;
pub use listener::{ListenCtx, Listener};
