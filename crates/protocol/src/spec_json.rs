// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The spec JSON schema external clients post to `POST /jobs/<sid>` (§6).
//!
//! [`procd_core::TemplateSpec`] is the internal, already-idiomatic shape
//! (nested `streams`, a struct `flapping`); this module is the looser wire
//! shape §6 actually documents (`args` as array-or-string, `flapping` as a
//! 4-tuple, output stream fields flattened to the top level) and converts
//! between the two.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use procd_core::{FlappingPolicy, StreamDecl, TemplateSpec, TemplateSpecError, UserRef};
use serde::{Deserialize, Serialize};

/// `args` as accepted on the wire: either a JSON array of strings, or a
/// single string split on whitespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
enum ArgsJson {
    Many(Vec<String>),
    One(String),
}

impl ArgsJson {
    fn into_vec(self) -> Vec<String> {
        match self {
            ArgsJson::Many(v) => v,
            ArgsJson::One(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }
}

fn default_args() -> ArgsJson {
    ArgsJson::Many(Vec::new())
}

/// `flapping` as accepted on the wire: `[attempts, window, retry_in,
/// max_retry]`, with `window`/`retry_in` in fractional seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FlappingTuple(u32, f64, f64, u32);

impl From<FlappingTuple> for FlappingPolicy {
    fn from(t: FlappingTuple) -> Self {
        FlappingPolicy {
            attempts: t.0,
            window: Duration::from_secs_f64(t.1.max(0.0)),
            retry_in: Duration::from_secs_f64(t.2.max(0.0)),
            max_retry: t.3,
        }
    }
}

impl From<FlappingPolicy> for FlappingTuple {
    fn from(p: FlappingPolicy) -> Self {
        FlappingTuple(
            p.attempts,
            p.window.as_secs_f64(),
            p.retry_in.as_secs_f64(),
            p.max_retry,
        )
    }
}

/// The `POST /jobs/<sid>` / `PUT /jobs/<sid>/<name>` request body (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecJson {
    pub name: String,
    pub cmd: String,
    #[serde(default = "default_args")]
    args: ArgsJson,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub uid: Option<UserRef>,
    #[serde(default)]
    pub gid: Option<UserRef>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub detach: bool,
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub os_env: bool,
    #[serde(default)]
    pub numprocesses: u32,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    flapping: Option<FlappingTuple>,
    #[serde(default)]
    pub redirect_output: Vec<String>,
    #[serde(default)]
    pub redirect_input: bool,
    /// `None` means "use the daemon's configured default"
    /// (`procd_core::DEFAULT_GRACEFUL_TIMEOUT` absent any further
    /// configuration) rather than baking a fixed default into the DTO.
    #[serde(default)]
    pub graceful_timeout: Option<f64>,
    #[serde(default)]
    pub custom_streams: Vec<String>,
    #[serde(default)]
    pub custom_channels: Vec<String>,
}

impl From<SpecJson> for TemplateSpec {
    fn from(s: SpecJson) -> Self {
        TemplateSpec {
            name: s.name,
            cmd: s.cmd,
            args: s.args.into_vec(),
            env: s.env,
            uid: s.uid,
            gid: s.gid,
            cwd: s.cwd,
            detach: s.detach,
            shell: s.shell,
            os_env: s.os_env,
            numprocesses: s.numprocesses,
            priority: s.priority,
            flapping: s.flapping.map(Into::into).unwrap_or_default(),
            streams: StreamDecl {
                redirect_output: s.redirect_output,
                redirect_input: s.redirect_input,
                custom_streams: s.custom_streams,
                custom_channels: s.custom_channels,
            },
            graceful_timeout: s
                .graceful_timeout
                .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
                .unwrap_or(procd_core::DEFAULT_GRACEFUL_TIMEOUT),
        }
    }
}

impl From<TemplateSpec> for SpecJson {
    fn from(t: TemplateSpec) -> Self {
        SpecJson {
            name: t.name,
            cmd: t.cmd,
            args: ArgsJson::Many(t.args),
            env: t.env,
            uid: t.uid,
            gid: t.gid,
            cwd: t.cwd,
            detach: t.detach,
            shell: t.shell,
            os_env: t.os_env,
            numprocesses: t.numprocesses,
            priority: t.priority,
            flapping: Some(t.flapping.into()),
            redirect_output: t.streams.redirect_output,
            redirect_input: t.streams.redirect_input,
            graceful_timeout: Some(t.graceful_timeout.as_secs_f64()),
            custom_streams: t.streams.custom_streams,
            custom_channels: t.streams.custom_channels,
        }
    }
}

impl SpecJson {
    /// Validate as a [`TemplateSpec`] would be validated, surfacing the same
    /// error type so callers map it to `InvalidSpec` the same way (§7).
    pub fn validate(&self) -> Result<(), TemplateSpecError> {
        let spec: TemplateSpec = self.clone().into();
        procd_core::validate_spec(&spec)
    }
}

#[cfg(test)]
#[path = "spec_json_tests.rs"]
mod tests;
