// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-to-template membership (§3, §9).
//!
//! A session groups the templates a single client loaded together, so they
//! can all be torn down at once when the client disconnects. Membership is
//! keyed by the fully qualified template name (`session.name`, see
//! [`crate::namespace`]), not by the bare name.

use std::collections::{HashMap, HashSet};

use crate::id::SessionId;

/// Tracks which qualified template names belong to which session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    members: HashMap<SessionId, HashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `qualified_name` belongs to `session`.
    pub fn register(&mut self, session: SessionId, qualified_name: String) {
        self.members.entry(session).or_default().insert(qualified_name);
    }

    /// Remove a single template from a session without tearing the session down.
    pub fn unregister(&mut self, session: &SessionId, qualified_name: &str) {
        if let Some(names) = self.members.get_mut(session) {
            names.remove(qualified_name);
            if names.is_empty() {
                self.members.remove(session);
            }
        }
    }

    /// Qualified template names currently registered under `session`.
    pub fn templates(&self, session: &SessionId) -> impl Iterator<Item = &str> {
        self.members
            .get(session)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Remove the whole session and return every qualified name it owned, so
    /// the caller can unload them all.
    pub fn remove_session(&mut self, session: &SessionId) -> HashSet<String> {
        self.members.remove(session).unwrap_or_default()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionId> {
        self.members.keys()
    }

    pub fn contains_session(&self, session: &SessionId) -> bool {
        self.members.contains_key(session)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
