// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response DTOs (§6).
//!
//! These summarize `procd-supervisor`'s domain types (`TemplateInfo`,
//! `InstanceInfo`, `StatsSnapshot`) without this crate depending on that
//! crate; `procd-daemon` is the one place that sits above both and converts
//! between them.

use procd_core::{Event, InstanceId};
use serde::{Deserialize, Serialize};

use crate::spec_json::SpecJson;

/// One template, as returned by `GET /jobs/<sid>/<name>` and listed by
/// `GET /jobs/<sid>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub session: String,
    pub name: String,
    pub qualified_name: String,
    pub spec: SpecJson,
    pub numprocesses: u32,
    pub running: usize,
    pub draining: bool,
}

/// One running instance, as returned by `GET /<pid>` and listed by
/// `GET /pids`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSummary {
    pub instance: InstanceId,
    pub template: String,
    /// `pending`, `spawning`, `running`, `terminating`, `exited`, or
    /// `spawn_failed` (§4.4).
    pub state: String,
    pub os_pid: Option<u32>,
    pub unsupervised: bool,
}

/// One instance's resource sample, as returned by `.../stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StatsEntry {
    pub instance: InstanceId,
    pub os_pid: u32,
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub vsz_bytes: u64,
}

/// Response from the daemon to a client (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Version { version: String },
    NodeInfo { version: String, uptime_secs: u64 },
    Sessions { sessions: Vec<String> },
    Jobs { jobs: Vec<String> },
    Job { job: Option<Box<JobSummary>> },
    NumProcesses { numprocesses: u32 },
    State { state: u8 },
    Stats {
        cpu_percent: f64,
        rss_bytes: u64,
        stats: Vec<StatsEntry>,
    },
    Pids { pids: Vec<InstanceId> },
    Instances { instances: Vec<InstanceSummary> },
    Instance { instance: Option<Box<InstanceSummary>> },
    InstanceStats { stats: Option<StatsEntry> },
    Committed { pid: InstanceId },
    /// One delivered event for a `Watch` request (§4.6). The internal
    /// socket protocol always returns this as plain JSON; the
    /// `eventsource`/`continuous`/`longpoll` text framings in [`crate::feed`]
    /// are for the external HTTP transport this workspace doesn't implement.
    WatchEvent { topic: String, event: Event },
    /// Error response, mapped from a `ManagerError` or `TemplateSpecError`
    /// by the daemon (§7); `conflict` marks the cases that should surface
    /// as HTTP 409 / CLI exit code 4 rather than a generic failure.
    Error { message: String, conflict: bool },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
