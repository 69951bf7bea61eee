// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! OS-facing process adapter (§4.4, §5): spawn, signal, wait, and stat
//! sampling behind a trait so the supervisor can be tested without forking
//! real processes.

pub mod adapter;
pub mod error;
pub mod real;
pub mod stats;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use adapter::{ChildHandle, ProcessAdapter, ProcessStats, RawExit, SpawnRequest};
pub use error::ProcessError;
pub use real::RealProcessAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessAdapter, ProcessCall};
