// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_utime_stime_starttime_from_stat_line() {
    // comm field deliberately contains a space and parens to exercise the
    // rfind(')')-based split.
    let line = "123 (my (weird) proc) S 1 123 123 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 5000 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
    let (utime, stime, starttime) = parse_stat(line).expect("parses");
    assert_eq!(utime, 10);
    assert_eq!(stime, 5);
    assert_eq!(starttime, 5000);
}

#[test]
fn parses_rss_and_vsz_from_status() {
    let status = "Name:\tfoo\nVmSize:\t  10240 kB\nVmRSS:\t   2048 kB\n";
    let (rss, vsz) = parse_status_rss_vsz(status);
    assert_eq!(rss, 2048 * 1024);
    assert_eq!(vsz, 10240 * 1024);
}

#[test]
fn missing_status_fields_default_to_zero() {
    let (rss, vsz) = parse_status_rss_vsz("Name:\tfoo\n");
    assert_eq!(rss, 0);
    assert_eq!(vsz, 0);
}

#[test]
fn reading_stats_for_current_process_succeeds() {
    let pid = std::process::id();
    let stats = read_process_stats(pid).expect("stats for self");
    assert!(stats.rss_bytes > 0);
}

#[test]
fn reading_stats_for_nonexistent_pid_fails() {
    let result = read_process_stats(u32::MAX - 1);
    assert!(result.is_err());
}
