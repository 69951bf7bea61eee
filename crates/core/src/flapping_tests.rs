// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn policy(attempts: u32, window_secs: u64, retry_in_secs: u64, max_retry: u32) -> FlappingPolicy {
    FlappingPolicy {
        attempts,
        window: Duration::from_secs(window_secs),
        retry_in: Duration::from_secs(retry_in_secs),
        max_retry,
    }
}

#[test]
fn disabled_policy_never_trips() {
    let mut w = FlappingWindow::new(FlappingPolicy::default());
    let now = Instant::now();
    for _ in 0..10 {
        assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
    }
    assert!(!w.is_retrying());
}

#[test]
fn trips_after_attempts_within_window() {
    let mut w = FlappingWindow::new(policy(3, 10, 1, 2));
    let now = Instant::now();
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
    match w.record_unexpected_exit(now) {
        FlappingOutcome::Retrying { retry_number: 0, .. } => {}
        other => panic!("expected first trip, got {other:?}"),
    }
    assert!(w.is_retrying());
}

#[test]
fn exhausting_max_retry_stops_flapping_exactly_once() {
    let mut w = FlappingWindow::new(policy(3, 10, 1, 2));
    let now = Instant::now();
    w.record_unexpected_exit(now);
    w.record_unexpected_exit(now);
    w.record_unexpected_exit(now); // trip: retrying

    match w.record_unexpected_exit(now) {
        FlappingOutcome::Retrying { retry_number: 1, .. } => {}
        other => panic!("expected retry 1, got {other:?}"),
    }
    match w.record_unexpected_exit(now) {
        FlappingOutcome::StoppedFlapping => {}
        other => panic!("expected stopped_flapping, got {other:?}"),
    }
    assert!(w.is_stopped());

    // Further exits are no-ops until explicitly reset.
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::AlreadyStopped);
}

#[test]
fn failures_outside_window_do_not_accumulate() {
    let mut w = FlappingWindow::new(policy(3, 1, 1, 1));
    let t0 = Instant::now();
    assert_eq!(w.record_unexpected_exit(t0), FlappingOutcome::Ok);
    let t1 = t0 + Duration::from_secs(2);
    // t0's exit has aged out of the 1s window; this is only the second
    // exit still considered "recent" from t1's point of view.
    assert_eq!(w.record_unexpected_exit(t1), FlappingOutcome::Ok);
}

#[test]
fn long_lived_instance_resets_the_window() {
    let mut w = FlappingWindow::new(policy(2, 10, 1, 1));
    let now = Instant::now();
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
    w.record_long_lived();
    // Without the reset this second exit would trip (attempts == 2).
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
}

#[test]
fn explicit_reset_clears_stopped_state() {
    let mut w = FlappingWindow::new(policy(1, 10, 1, 0));
    let now = Instant::now();
    match w.record_unexpected_exit(now) {
        FlappingOutcome::Retrying { .. } => {}
        other => panic!("expected trip, got {other:?}"),
    }
    assert_eq!(
        w.record_unexpected_exit(now),
        FlappingOutcome::StoppedFlapping
    );
    w.reset();
    assert!(!w.is_stopped());
    assert_eq!(w.record_unexpected_exit(now), FlappingOutcome::Ok);
}
