// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Topic-tree publish/subscribe (§3 Subscription, §4.6 EventEmitter).

pub mod emitter;
pub mod error;
pub mod topic;

pub use emitter::{Delivered, EventEmitter, OverflowPolicy, Subscription};
pub use error::BusError;
pub use topic::Pattern;
