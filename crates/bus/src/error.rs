// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::emitter::OverflowPolicy;

/// Errors surfaced from bus operations (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("subscription {0} not found")]
    NotFound(u64),

    /// A subscriber's queue overflowed and its configured policy dropped
    /// an event instead of delivering it (§4.6, §7).
    #[error("subscriber {subscription} backpressure: dropped under {policy:?}")]
    BackpressureDropped {
        subscription: u64,
        policy: OverflowPolicy,
    },

    /// `OverflowPolicy::Disconnect` tripped; the subscription was torn down.
    #[error("subscriber {0} disconnected after queue overflow")]
    Disconnected(u64),
}
