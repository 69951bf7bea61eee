// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types and generators.
//!
//! [`InstanceId`] is the manager-internal "pid" from the spec: a
//! strictly monotonically increasing, never-reused integer assigned when an
//! instance is created. It is distinct from the OS process id, which is only
//! known once the child has actually been spawned.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifies a grouping key prefixed to template names (§3, §9).
    pub struct SessionId;
}

/// Manager-internal instance id ("pid" in the spec's vocabulary).
///
/// Strictly monotonically increasing and never reused for the lifetime of a
/// single `Manager` (§8 invariant). Deliberately *not* the OS process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates strictly increasing [`InstanceId`]s.
///
/// Cloneable and shareable across threads: the counter lives behind an
/// `Arc<AtomicU64>` so every clone of a generator still draws from the same
/// sequence, which is what lets the Manager hand the same generator to both
/// its command-loop and any spawned reaper tasks.
#[derive(Clone, Default)]
pub struct InstanceIdGen {
    next: Arc<AtomicU64>,
}

impl InstanceIdGen {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate the next id. Ids start at 1; 0 is reserved as "no instance".
    pub fn next(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
