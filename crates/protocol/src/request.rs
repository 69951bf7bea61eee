// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request DTOs for the Manager's public operations (§4.1, §6).

use std::collections::HashMap;

use procd_core::InstanceId;
use serde::{Deserialize, Serialize};

use crate::spec_json::SpecJson;

/// `{scale:"+N"|"-N"|"=N"}` (§6 `numprocesses`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleSpec {
    Delta(i64),
    Absolute(u32),
}

impl std::str::FromStr for ScaleSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let sign = chars
            .next()
            .ok_or_else(|| "empty scale spec".to_string())?;
        let digits = chars.as_str();
        match sign {
            '+' => digits
                .parse::<i64>()
                .map(ScaleSpec::Delta)
                .map_err(|e| e.to_string()),
            '-' => digits
                .parse::<i64>()
                .map(|n| ScaleSpec::Delta(-n))
                .map_err(|e| e.to_string()),
            '=' => digits
                .parse::<u32>()
                .map(ScaleSpec::Absolute)
                .map_err(|e| e.to_string()),
            _ => Err(format!("scale spec '{s}' must start with +, -, or =")),
        }
    }
}

impl std::fmt::Display for ScaleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleSpec::Delta(n) if *n >= 0 => write!(f, "+{n}"),
            ScaleSpec::Delta(n) => write!(f, "-{}", -n),
            ScaleSpec::Absolute(n) => write!(f, "={n}"),
        }
    }
}

impl Serialize for ScaleSpec {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScaleSpec {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Body of `GET/POST .../state`: `0|1|2` for stop/start/reload (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSpec {
    Stop,
    Start,
    Reload,
}

impl TryFrom<u8> for StateSpec {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            0 => Ok(StateSpec::Stop),
            1 => Ok(StateSpec::Start),
            2 => Ok(StateSpec::Reload),
            other => Err(format!("state must be 0, 1, or 2, got {other}")),
        }
    }
}

impl From<StateSpec> for u8 {
    fn from(s: StateSpec) -> Self {
        match s {
            StateSpec::Stop => 0,
            StateSpec::Start => 1,
            StateSpec::Reload => 2,
        }
    }
}

impl Serialize for StateSpec {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for StateSpec {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(d)?;
        raw.try_into().map_err(serde::de::Error::custom)
    }
}

/// Request from a client to the daemon (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// `GET /ping`
    Ping,
    /// `GET /version`
    Version,
    /// `GET /`
    NodeInfo,
    /// `GET /sessions`
    ListSessions,
    /// `GET /jobs`, or `GET /jobs/<sid>` when `session` is set
    ListJobs { session: Option<String> },
    /// `GET /jobs/<sid>/<name>`
    GetJob { session: String, name: String },
    /// `POST /jobs/<sid>`
    LoadTemplate { session: String, spec: SpecJson },
    /// `PUT /jobs/<sid>/<name>`
    UpdateTemplate {
        session: String,
        name: String,
        spec: SpecJson,
    },
    /// `DELETE /jobs/<sid>/<name>`
    UnloadTemplate { session: String, name: String },
    /// `GET .../numprocesses`
    GetNumProcesses { session: String, name: String },
    /// `POST .../numprocesses`
    Scale {
        session: String,
        name: String,
        scale: ScaleSpec,
    },
    /// `GET .../state`
    GetState { session: String, name: String },
    /// `POST .../state`
    SetState {
        /// `None` applies to every loaded template, mirroring the Manager's
        /// global start/stop/reload operations (§4.1).
        session: Option<String>,
        name: Option<String>,
        state: StateSpec,
    },
    /// `POST .../signal`
    SignalTemplate {
        session: String,
        name: String,
        signal: i32,
    },
    /// `GET .../stats`
    GetTemplateStats { session: String, name: String },
    /// `GET .../pids`
    GetTemplatePids { session: String, name: String },
    /// `POST .../commit`
    Commit {
        session: String,
        name: String,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        graceful_timeout: Option<f64>,
    },
    /// `GET /pids`
    ListInstances,
    /// `GET /<pid>`
    GetInstance { instance: InstanceId },
    /// `DELETE /<pid>`
    StopInstance { instance: InstanceId },
    /// `POST /<pid>/signal`
    SignalInstance { instance: InstanceId, signal: i32 },
    /// `GET /<pid>/stats`
    GetInstanceStats { instance: InstanceId },
    /// `POST /streams/<pid>/stdin`
    WriteStdin { os_pid: u32, data: Vec<u8> },
    /// `GET /watch/...` (the subscription itself; matching is done against
    /// the topic pattern, not modeled further here since it's the same
    /// dot-segmented pattern `procd-bus::Pattern` already parses).
    /// `heartbeat` is the requested keepalive interval in fractional
    /// seconds (§3 Subscription, §4.5); `None` means no heartbeat.
    Watch {
        pattern: String,
        feed: crate::Feed,
        #[serde(default)]
        heartbeat: Option<f64>,
    },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
