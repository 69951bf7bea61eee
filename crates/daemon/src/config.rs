// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration, read from environment variables with defaults.
//!
//! Mirrors `oj-daemon::env`'s fallback-chain style (`OJ_STATE_DIR` >
//! `XDG_STATE_HOME` > a fixed default) rather than a TOML loader: the
//! declarative Procfile/INI config format is an explicit external
//! collaborator (§1), not something this workspace parses.

use std::time::Duration;

/// Daemon configuration (§2a).
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the internal control-socket used by the workspace's own
    /// integration tests; not the HTTP/WS transport described in §6.
    pub socket_path: std::path::PathBuf,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"procd_supervisor=debug,info"`.
    pub log_level: String,
    /// Stats-sample / timer-check cadence for the Manager loop.
    pub timer_resolution: Duration,
    /// Default `graceful_timeout` for templates that don't set one,
    /// overriding `procd_core::DEFAULT_GRACEFUL_TIMEOUT`.
    pub default_graceful_timeout: Duration,
}

impl Config {
    /// Resolve configuration: `PROCD_SOCKET_PATH` >
    /// `XDG_RUNTIME_DIR/procd.sock` > `/tmp/procd.sock`; `PROCD_LOG` >
    /// `"info"`; `PROCD_TIMER_MS` > 100; `PROCD_GRACEFUL_TIMEOUT_SECS` >
    /// `procd_core::DEFAULT_GRACEFUL_TIMEOUT`.
    pub fn load() -> Self {
        Config {
            socket_path: resolve_socket_path(
                std::env::var("PROCD_SOCKET_PATH").ok(),
                std::env::var("XDG_RUNTIME_DIR").ok(),
            ),
            log_level: std::env::var("PROCD_LOG").unwrap_or_else(|_| "info".to_string()),
            timer_resolution: resolve_timer_resolution(std::env::var("PROCD_TIMER_MS").ok()),
            default_graceful_timeout: resolve_graceful_timeout(
                std::env::var("PROCD_GRACEFUL_TIMEOUT_SECS").ok(),
            ),
        }
    }
}

// The parsing logic lives in these free functions, taking already-read
// `Option<String>`s rather than calling `std::env::var` directly, so tests
// can exercise the fallback chains without mutating process-global env vars.

fn resolve_socket_path(explicit: Option<String>, xdg_runtime_dir: Option<String>) -> std::path::PathBuf {
    if let Some(path) = explicit {
        return std::path::PathBuf::from(path);
    }
    if let Some(runtime_dir) = xdg_runtime_dir {
        return std::path::PathBuf::from(runtime_dir).join("procd.sock");
    }
    std::path::PathBuf::from("/tmp/procd.sock")
}

fn resolve_timer_resolution(raw: Option<String>) -> Duration {
    raw.and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(100))
}

fn resolve_graceful_timeout(raw: Option<String>) -> Duration {
    raw.and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(procd_core::DEFAULT_GRACEFUL_TIMEOUT)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
