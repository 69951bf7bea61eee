// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::InstanceIdGen;

fn new_instance(unsupervised: bool) -> ProcessInstance {
    let gen = InstanceIdGen::new();
    ProcessInstance::new(gen.next(), "app.web".to_string(), Instant::now(), unsupervised)
}

#[test]
fn fresh_instance_starts_pending() {
    let inst = new_instance(false);
    assert_eq!(inst.state, InstanceState::Pending);
    assert!(!inst.state.is_terminal());
}

#[test]
fn running_state_exposes_os_pid() {
    let state = InstanceState::Running { os_pid: 1234 };
    assert_eq!(state.os_pid(), Some(1234));
    assert!(state.is_running());
}

#[test]
fn exit_with_no_stop_requested_is_unexpected() {
    let inst = new_instance(false);
    let exit = ExitStatus {
        exit_status: Some(1),
        term_signal: None,
        reaped: ReapedKind::Normal,
    };
    assert!(inst.is_unexpected_exit(&exit, false));
}

#[test]
fn clean_exit_after_requested_stop_within_timeout_is_expected() {
    let mut inst = new_instance(false);
    inst.stop_reason = StopReason::Requested;
    let exit = ExitStatus {
        exit_status: Some(0),
        term_signal: None,
        reaped: ReapedKind::Graceful,
    };
    assert!(!inst.is_unexpected_exit(&exit, false));
}

#[test]
fn nonzero_exit_after_requested_stop_is_still_unexpected() {
    let mut inst = new_instance(false);
    inst.stop_reason = StopReason::Requested;
    let exit = ExitStatus {
        exit_status: Some(1),
        term_signal: None,
        reaped: ReapedKind::Forced,
    };
    assert!(inst.is_unexpected_exit(&exit, false));
}

#[test]
fn clean_exit_after_graceful_timeout_elapsed_is_unexpected() {
    let mut inst = new_instance(false);
    inst.stop_reason = StopReason::Requested;
    let exit = ExitStatus {
        exit_status: Some(0),
        term_signal: None,
        reaped: ReapedKind::Forced,
    };
    assert!(inst.is_unexpected_exit(&exit, true));
}
