// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The OS-facing process adapter trait (§4.4, §5).
//!
//! Grounded on `oj-adapters::session::SessionAdapter`: a small async trait
//! with a real implementation ([`crate::real::RealProcessAdapter`]) and a
//! fake one ([`crate::fake::FakeProcessAdapter`], `test-support`-gated) that
//! the supervisor tests against without ever forking a real process.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ProcessError;

/// Resolved request to spawn one child process. All `$VAR` substitution and
/// environment overlay has already happened in `procd-core::template`; this
/// is what actually gets handed to `exec`.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub cmd: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub shell: bool,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    pub capture_stdin: bool,
}

/// Raw exit information, before the supervisor interprets it against
/// `StopReason` to classify `reaped` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExit {
    pub exit_status: Option<i32>,
    pub term_signal: Option<i32>,
}

/// A spawned child process: stdio handles plus lifecycle control.
///
/// Object-safe so both the real and fake adapters can return the same
/// boxed type (`async-trait` makes this possible despite the `async fn`).
#[async_trait]
pub trait ChildHandle: Send {
    fn os_pid(&self) -> u32;

    /// Take ownership of the child's stdin, if captured. Can only be taken once.
    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>>;
    /// Take ownership of the child's stdout, if captured. Can only be taken once.
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    /// Take ownership of the child's stderr, if captured. Can only be taken once.
    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;

    /// Await process exit (the SIGCHLD-reap suspension point from §5).
    async fn wait(&mut self) -> std::io::Result<RawExit>;

    /// Best-effort hard kill, used on the forced-kill escalation path (§4.4).
    fn start_kill(&mut self) -> std::io::Result<()>;
}

/// Point-in-time resource usage for one OS process (§4.4 stats sampling).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStats {
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub vsz_bytes: u64,
}

/// Adapter for spawning, signaling, and inspecting OS processes.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    async fn spawn(&self, req: SpawnRequest) -> Result<Box<dyn ChildHandle>, ProcessError>;

    /// Deliver an arbitrary signal to a live OS process (§6 `signal(qname|pid, signalNumber)`).
    async fn signal(&self, os_pid: u32, signal_number: i32) -> Result<(), ProcessError>;

    /// Sample resource usage for a live OS process (§4.4). Gated by the
    /// caller on subscriber presence, not by this trait.
    async fn stats(&self, os_pid: u32) -> Result<ProcessStats, ProcessError>;
}
