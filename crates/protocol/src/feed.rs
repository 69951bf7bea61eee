// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event stream encodings for `/streams/...` and `/watch/...` (§6).
//!
//! These are pure formatting functions over an already-serialized event;
//! they don't know how to open a subscription or drive a socket, so the
//! same encodings work whether the eventual transport is a raw TCP stream,
//! a `hyper` body, or the daemon's own length-prefixed socket.

use serde::{Deserialize, Serialize};

/// `feed=` query parameter on `/streams/...` and `/watch/...` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// One JSON object per line, connection stays open.
    Continuous,
    /// One event, then the connection closes.
    Longpoll,
    /// `text/event-stream` framing: `event: <name>\ndata: <json>\n\n`.
    Eventsource,
}

/// Encode one named, JSON-serializable event per `feed`'s framing rules.
///
/// `name` is the event's topic (e.g. `spawn`, `proc.web.exit`); `payload`
/// must already be a complete JSON value. Returns the bytes to write to the
/// stream for this single event; callers loop for `Continuous` and
/// `Eventsource`, and close after one call for `Longpoll`.
pub fn encode_event(feed: Feed, name: &str, payload: &serde_json::Value) -> String {
    match feed {
        Feed::Continuous | Feed::Longpoll => format!("{payload}\n"),
        Feed::Eventsource => format!("event: {name}\ndata: {payload}\n\n"),
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
