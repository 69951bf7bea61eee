// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn socket_path_prefers_the_explicit_override() {
    let path = resolve_socket_path(
        Some("/run/procd/custom.sock".to_string()),
        Some("/run/user/1000".to_string()),
    );
    assert_eq!(path, std::path::PathBuf::from("/run/procd/custom.sock"));
}

#[test]
fn socket_path_falls_back_to_xdg_runtime_dir() {
    let path = resolve_socket_path(None, Some("/run/user/1000".to_string()));
    assert_eq!(path, std::path::PathBuf::from("/run/user/1000/procd.sock"));
}

#[test]
fn socket_path_falls_back_to_tmp_when_nothing_is_set() {
    let path = resolve_socket_path(None, None);
    assert_eq!(path, std::path::PathBuf::from("/tmp/procd.sock"));
}

#[test]
fn timer_resolution_parses_a_valid_value() {
    assert_eq!(
        resolve_timer_resolution(Some("250".to_string())),
        Duration::from_millis(250)
    );
}

#[test]
fn timer_resolution_defaults_when_unset() {
    assert_eq!(resolve_timer_resolution(None), Duration::from_millis(100));
}

#[test]
fn timer_resolution_defaults_on_garbage_input() {
    assert_eq!(
        resolve_timer_resolution(Some("not-a-number".to_string())),
        Duration::from_millis(100)
    );
}

#[test]
fn graceful_timeout_parses_a_valid_value() {
    assert_eq!(
        resolve_graceful_timeout(Some("45".to_string())),
        Duration::from_secs(45)
    );
}

#[test]
fn graceful_timeout_defaults_when_unset() {
    assert_eq!(
        resolve_graceful_timeout(None),
        procd_core::DEFAULT_GRACEFUL_TIMEOUT
    );
}

#[test]
fn graceful_timeout_defaults_on_garbage_input() {
    assert_eq!(
        resolve_graceful_timeout(Some("soon".to_string())),
        procd_core::DEFAULT_GRACEFUL_TIMEOUT
    );
}
