// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event payloads and topic naming (§4.6, §6).
//!
//! `procd-bus` owns the publish/subscribe machinery and topic pattern
//! matching; this module only defines what an event *is* and which topic
//! string it's published under, so both the bus and the protocol layer can
//! depend on a single definition.

use serde::{Deserialize, Serialize};

use crate::id::InstanceId;
use crate::instance::ExitStatus;

/// A single published event (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Create { template: String },
    Start { template: String },
    Stop { template: String },
    Restart { template: String },
    Update { template: String },
    Delete { template: String },
    Spawn {
        template: String,
        instance: InstanceId,
        os_pid: u32,
    },
    Reap {
        template: String,
        instance: InstanceId,
        exit: ExitStatus,
    },
    Exit {
        template: String,
        instance: InstanceId,
        exit: ExitStatus,
    },
    StopPid {
        template: String,
        instance: InstanceId,
        os_pid: u32,
    },
    /// Exec/fork failure (§4.1, §4.4 `SPAWNING -> SPAWN_FAILED`). Not in
    /// §4.6's canonical topic list, which is illustrative rather than
    /// exhaustive; named and scoped the same way as the other lifecycle
    /// events it sits beside.
    SpawnError {
        template: String,
        instance: InstanceId,
        message: String,
    },
    /// Flapping detector gave up on this template (§4.3).
    StoppedFlapping { template: String },
    Stats {
        os_pid: u32,
        cpu_percent: f64,
        rss_bytes: u64,
        vsz_bytes: u64,
    },
    Stream {
        os_pid: u32,
        label: String,
        data: Vec<u8>,
    },
    /// Synthesized by a `Subscription` itself when its configured
    /// heartbeat interval elapses with no real event to deliver (§3
    /// Subscription, §4.5 "the mux emits a zero-length keepalive event at
    /// that cadence in the absence of real data"). Never published through
    /// `EventEmitter::publish`, so it carries no topic of its own and is
    /// tagged with whatever topic/pattern the subscriber is watching.
    Heartbeat,
}

impl Event {
    /// The topics this event is published under (§4.6).
    ///
    /// Most instance-lifecycle events publish twice: once under their bare
    /// canonical name (`spawn`) for global subscribers, and once under the
    /// per-template namespaced form (`proc.<name>.spawn`) for subscribers
    /// scoped to one template. `create`/`update`/`delete`/`restart` are
    /// global-only per §4.6's canonical topic list.
    pub fn topics(&self) -> Vec<String> {
        match self {
            Event::Create { .. } => vec!["create".to_string()],
            Event::Restart { .. } => vec!["restart".to_string()],
            Event::Update { .. } => vec!["update".to_string()],
            Event::Delete { .. } => vec!["delete".to_string()],
            Event::Start { template } => vec!["start".to_string(), format!("proc.{template}.start")],
            Event::Stop { template } => vec!["stop".to_string(), format!("proc.{template}.stop")],
            Event::Spawn { template, .. } => {
                vec!["spawn".to_string(), format!("proc.{template}.spawn")]
            }
            Event::Reap { template, .. } => {
                vec!["reap".to_string(), format!("proc.{template}.reap")]
            }
            Event::Exit { template, .. } => {
                vec!["exit".to_string(), format!("proc.{template}.exit")]
            }
            Event::StopPid { template, .. } => {
                vec!["stop_pid".to_string(), format!("proc.{template}.stop_pid")]
            }
            Event::SpawnError { template, .. } => vec![
                "spawn_error".to_string(),
                format!("proc.{template}.spawn_error"),
            ],
            Event::StoppedFlapping { template } => vec![
                "stopped_flapping".to_string(),
                format!("proc.{template}.stopped_flapping"),
            ],
            Event::Stats { os_pid, .. } => vec![format!("stats.{os_pid}")],
            Event::Stream { os_pid, label, .. } => vec![format!("stream.{os_pid}.{label}")],
            // Never routed through `publish`; a subscription synthesizes
            // this for itself and tags the delivery with its own pattern.
            Event::Heartbeat => vec![],
        }
    }

    pub fn template(&self) -> Option<&str> {
        match self {
            Event::Create { template }
            | Event::Start { template }
            | Event::Stop { template }
            | Event::Restart { template }
            | Event::Update { template }
            | Event::Delete { template }
            | Event::Spawn { template, .. }
            | Event::Reap { template, .. }
            | Event::Exit { template, .. }
            | Event::StopPid { template, .. }
            | Event::SpawnError { template, .. }
            | Event::StoppedFlapping { template } => Some(template.as_str()),
            Event::Stats { .. } | Event::Stream { .. } | Event::Heartbeat => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
