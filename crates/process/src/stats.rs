// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/proc/<pid>` resource-usage sampling (§4.4).
//!
//! CPU percent is derived from cumulative ticks (`utime + stime` from
//! `/proc/<pid>/stat`) divided by wall-clock ticks since the process
//! started, which is only meaningful averaged over the sampler's cadence —
//! callers should treat a single sample as "average CPU since last sample"
//! rather than an instantaneous figure.

use std::fs;

use crate::adapter::ProcessStats;
use crate::error::ProcessError;

const CLOCK_TICKS_PER_SEC: f64 = 100.0;

fn read_uptime_secs() -> Option<f64> {
    let raw = fs::read_to_string("/proc/uptime").ok()?;
    raw.split_whitespace().next()?.parse::<f64>().ok()
}

/// Parse the handful of fields we need out of `/proc/<pid>/stat`.
///
/// Field 2 (`comm`) is parenthesized and may itself contain spaces or
/// parens, so we locate it by the *last* `)` rather than splitting naively.
fn parse_stat(contents: &str) -> Option<(u64, u64, u64)> {
    let close = contents.rfind(')')?;
    let rest = &contents[close + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After `pid (comm) state`, field index 0 is `state`; utime/stime are
    // fields 14/15 of the whole record, i.e. indices 11/12 here.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let starttime: u64 = fields.get(19)?.parse().ok()?;
    Some((utime, stime, starttime))
}

fn parse_status_rss_vsz(contents: &str) -> (u64, u64) {
    let mut rss_kb = 0u64;
    let mut vsz_kb = 0u64;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            vsz_kb = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0);
        }
    }
    (rss_kb * 1024, vsz_kb * 1024)
}

pub fn read_process_stats(pid: u32) -> Result<ProcessStats, ProcessError> {
    let stat_path = format!("/proc/{pid}/stat");
    let stat = fs::read_to_string(&stat_path).map_err(|source| ProcessError::StatsUnavailable {
        pid,
        source,
    })?;
    let (utime, stime, starttime) =
        parse_stat(&stat).ok_or_else(|| ProcessError::StatsUnavailable {
            pid,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "unparsable /proc/pid/stat"),
        })?;

    let status_path = format!("/proc/{pid}/status");
    let status = fs::read_to_string(&status_path).unwrap_or_default();
    let (rss_bytes, vsz_bytes) = parse_status_rss_vsz(&status);

    let uptime = read_uptime_secs().unwrap_or(0.0);
    let process_start_secs = starttime as f64 / CLOCK_TICKS_PER_SEC;
    let process_age_secs = (uptime - process_start_secs).max(0.001);
    let total_cpu_secs = (utime + stime) as f64 / CLOCK_TICKS_PER_SEC;
    let cpu_percent = (total_cpu_secs / process_age_secs) * 100.0;

    Ok(ProcessStats {
        cpu_percent,
        rss_bytes,
        vsz_bytes,
    })
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
