// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative process template (§3, §4.2).
//!
//! A template is pure data plus the validation and `$VAR` substitution
//! rules that derive from it. It owns no OS resources; [`crate::instance`]
//! and the `procd-process` adapter do.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default graceful shutdown timeout when a spec doesn't set one (§4.2).
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of `redirect_output` labels (§4.2).
pub const MAX_REDIRECT_OUTPUT_LABELS: usize = 2;

/// A user or group id, accepted as either a numeric id or a name to resolve
/// at spawn time (§6 spec JSON: `uid`/`gid` are `int|string`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(u32),
    Name(String),
}

/// Per-template crash-rate policy (§3 FlappingWindow, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlappingPolicy {
    /// Number of unexpected exits within `window` that trips the detector.
    pub attempts: u32,
    /// Sliding window length.
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// Delay before each deferred retry once tripped.
    #[serde(with = "duration_secs")]
    pub retry_in: Duration,
    /// Number of deferred retries allowed before giving up entirely.
    pub max_retry: u32,
}

impl Default for FlappingPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            window: Duration::from_secs(0),
            retry_in: Duration::from_secs(0),
            max_retry: 0,
        }
    }
}

impl FlappingPolicy {
    /// A policy with `attempts == 0` never trips; it's the default for
    /// templates that don't configure `flapping` in their spec.
    pub fn disabled(&self) -> bool {
        self.attempts == 0
    }
}

/// Declared output streams for a template (§4.2 `redirect_output`).
///
/// At most [`MAX_REDIRECT_OUTPUT_LABELS`] labels. Repeating a label is the
/// signal to merge stderr into stdout under that single label (§4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDecl {
    pub redirect_output: Vec<String>,
    pub redirect_input: bool,
    #[serde(default)]
    pub custom_streams: Vec<String>,
    #[serde(default)]
    pub custom_channels: Vec<String>,
}

impl StreamDecl {
    /// True when `redirect_output` names the same label twice, i.e. stderr
    /// should be merged into stdout's single stream.
    pub fn merges_stderr(&self) -> bool {
        self.redirect_output.len() == 2 && self.redirect_output[0] == self.redirect_output[1]
    }

    /// Effective, de-duplicated set of output labels to actually open pipes for.
    pub fn effective_labels(&self) -> Vec<String> {
        if self.merges_stderr() {
            vec![self.redirect_output[0].clone()]
        } else {
            self.redirect_output.clone()
        }
    }
}

/// Declarative spec for a process template, as accepted by `load`/`update`
/// (§4.1, §6 spec JSON schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
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
    pub flapping: FlappingPolicy,
    #[serde(default)]
    pub streams: StreamDecl,
    #[serde(default = "default_graceful_timeout")]
    #[serde(with = "duration_secs")]
    pub graceful_timeout: Duration,
}

fn default_graceful_timeout() -> Duration {
    DEFAULT_GRACEFUL_TIMEOUT
}

/// Validation failures for a [`TemplateSpec`] (§7 `InvalidSpec`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateSpecError {
    #[error("invalid name '{0}': must match [A-Za-z0-9_-]+")]
    InvalidName(String),
    #[error("cmd must not be empty")]
    EmptyCmd,
    #[error("redirect_output may declare at most {max} labels, got {got}")]
    TooManyOutputLabels { max: usize, got: usize },
    #[error("redirect_output labels must be unique unless repeated to merge stderr into stdout")]
    DuplicateOutputLabels,
}

/// Validate a name against `[A-Za-z0-9_-]+` (§4.2).
pub fn validate_name(name: &str) -> Result<(), TemplateSpecError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(TemplateSpecError::InvalidName(name.to_string()))
    }
}

/// Validate a full spec (§4.2). `numprocesses` and `graceful_timeout` are
/// unsigned by construction so only the remaining rules need checking.
pub fn validate_spec(spec: &TemplateSpec) -> Result<(), TemplateSpecError> {
    validate_name(&spec.name)?;
    if spec.cmd.trim().is_empty() {
        return Err(TemplateSpecError::EmptyCmd);
    }
    let labels = &spec.streams.redirect_output;
    if labels.len() > MAX_REDIRECT_OUTPUT_LABELS {
        return Err(TemplateSpecError::TooManyOutputLabels {
            max: MAX_REDIRECT_OUTPUT_LABELS,
            got: labels.len(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    let mut has_exact_duplicate = false;
    for label in labels {
        if !seen.insert(label.as_str()) {
            has_exact_duplicate = true;
        }
    }
    if has_exact_duplicate && !spec.streams.merges_stderr() {
        return Err(TemplateSpecError::DuplicateOutputLabels);
    }
    Ok(())
}

/// Resolve the environment a command spawns with: the OS environment when
/// `os_env` is set, overlaid by the template's explicit `env` map (§4.2).
///
/// Pure function of its inputs so it can be unit-tested without touching
/// the real process environment; callers pass `os_env_vars` explicitly.
pub fn resolve_environment(
    os_env: bool,
    os_env_vars: &HashMap<String, String>,
    explicit: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut resolved = if os_env {
        os_env_vars.clone()
    } else {
        HashMap::new()
    };
    for (k, v) in explicit {
        resolved.insert(k.clone(), v.clone());
    }
    resolved
}

/// Substitute `$VAR` and `${VAR}` references in `input` against `env`.
///
/// Applied to `cmd` and each entry of `args` at spawn time, not at template
/// load time (§4.2) — the resolved environment can differ per spawn if the
/// template's `env` overlay or the OS environment changed.
pub fn substitute_vars(input: &str, env: &HashMap<String, String>) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(rel_end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let end = i + 2 + rel_end;
                    let name: String = chars[i + 2..end].iter().collect();
                    if let Some(val) = env.get(&name) {
                        out.push_str(val);
                    }
                    i = end + 1;
                    continue;
                }
            } else if chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                if let Some(val) = env.get(&name) {
                    out.push_str(val);
                }
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
