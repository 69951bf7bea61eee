// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

fn request(cmd: &str) -> SpawnRequest {
    SpawnRequest {
        cmd: cmd.to_string(),
        args: vec![],
        env: HashMap::new(),
        cwd: None,
        uid: None,
        gid: None,
        shell: false,
        capture_stdout: false,
        capture_stderr: false,
        capture_stdin: false,
    }
}

#[tokio::test]
async fn spawn_assigns_increasing_fake_pids() {
    let adapter = FakeProcessAdapter::new();
    let a = adapter.spawn(request("a")).await.unwrap();
    let b = adapter.spawn(request("b")).await.unwrap();
    assert!(b.os_pid() > a.os_pid());
}

#[tokio::test]
async fn complete_resolves_the_pending_wait() {
    let adapter = FakeProcessAdapter::new();
    let mut child = adapter.spawn(request("a")).await.unwrap();
    let pid = child.os_pid();
    adapter.complete(
        pid,
        RawExit {
            exit_status: Some(7),
            term_signal: None,
        },
    );
    let exit = child.wait().await.unwrap();
    assert_eq!(exit.exit_status, Some(7));
}

#[tokio::test]
async fn fail_spawn_for_makes_the_next_matching_spawn_error() {
    let adapter = FakeProcessAdapter::new();
    adapter.fail_spawn_for("missing");
    assert!(adapter.spawn(request("missing")).await.is_err());
    // Only the next one fails.
    assert!(adapter.spawn(request("missing")).await.is_ok());
}

#[tokio::test]
async fn signal_is_recorded_and_fails_for_unknown_pid() {
    let adapter = FakeProcessAdapter::new();
    let child = adapter.spawn(request("a")).await.unwrap();
    adapter.signal(child.os_pid(), 15).await.unwrap();
    assert_eq!(adapter.signals_received(child.os_pid()), vec![15]);
    assert!(adapter.signal(99999, 15).await.is_err());
}

#[tokio::test]
async fn stats_reflect_what_tests_configure() {
    let adapter = FakeProcessAdapter::new();
    let child = adapter.spawn(request("a")).await.unwrap();
    assert!(adapter.stats(child.os_pid()).await.is_err());
    adapter.set_stats(
        child.os_pid(),
        ProcessStats {
            cpu_percent: 12.5,
            rss_bytes: 4096,
            vsz_bytes: 8192,
        },
    );
    let stats = adapter.stats(child.os_pid()).await.unwrap();
    assert_eq!(stats.rss_bytes, 4096);
}
