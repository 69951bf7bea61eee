// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory process adapter for supervisor tests (§8), grounded on
//! `oj-adapters::session::fake::FakeSessionAdapter`. No real process is
//! ever spawned; exits are driven explicitly by test code via [`FakeProcessAdapter::complete`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::adapter::{ChildHandle, ProcessAdapter, ProcessStats, RawExit, SpawnRequest};
use crate::error::ProcessError;

/// Recorded call, inspectable from tests.
#[derive(Debug, Clone)]
pub enum ProcessCall {
    Spawn { cmd: String, args: Vec<String> },
    Signal { os_pid: u32, signal_number: i32 },
    Stats { os_pid: u32 },
}

struct FakeProcessState {
    next_pid: u32,
    calls: Vec<ProcessCall>,
    exit_senders: HashMap<u32, oneshot::Sender<RawExit>>,
    signals_received: HashMap<u32, Vec<i32>>,
    stats: HashMap<u32, ProcessStats>,
    fail_spawn_for: Option<String>,
}

/// Fake [`ProcessAdapter`] for deterministic supervisor tests.
#[derive(Clone)]
pub struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeProcessState>>,
}

impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeProcessState {
                next_pid: 1000,
                calls: Vec::new(),
                exit_senders: HashMap::new(),
                signals_received: HashMap::new(),
                stats: HashMap::new(),
                fail_spawn_for: None,
            })),
        }
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        self.inner.lock().calls.clone()
    }

    /// Make the next `spawn()` for `cmd` fail with `SpawnFailed` (§8's
    /// `missing_binary` / `spawn_error` scenarios).
    pub fn fail_spawn_for(&self, cmd: impl Into<String>) {
        self.inner.lock().fail_spawn_for = Some(cmd.into());
    }

    /// Simulate the process at `os_pid` exiting with `exit`.
    pub fn complete(&self, os_pid: u32, exit: RawExit) {
        if let Some(tx) = self.inner.lock().exit_senders.remove(&os_pid) {
            let _ = tx.send(exit);
        }
    }

    pub fn signals_received(&self, os_pid: u32) -> Vec<i32> {
        self.inner
            .lock()
            .signals_received
            .get(&os_pid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_stats(&self, os_pid: u32, stats: ProcessStats) {
        self.inner.lock().stats.insert(os_pid, stats);
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(&self, req: SpawnRequest) -> Result<Box<dyn ChildHandle>, ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Spawn {
            cmd: req.cmd.clone(),
            args: req.args.clone(),
        });

        if inner.fail_spawn_for.as_deref() == Some(req.cmd.as_str()) {
            inner.fail_spawn_for = None;
            return Err(ProcessError::SpawnFailed(format!("no such file: {}", req.cmd)));
        }

        let pid = inner.next_pid;
        inner.next_pid += 1;
        let (tx, rx) = oneshot::channel();
        inner.exit_senders.insert(pid, tx);

        Ok(Box::new(FakeChildHandle {
            os_pid: pid,
            exit_rx: Some(rx),
        }))
    }

    async fn signal(&self, os_pid: u32, signal_number: i32) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        if !inner.exit_senders.contains_key(&os_pid) {
            return Err(ProcessError::NotFound(os_pid));
        }
        inner
            .signals_received
            .entry(os_pid)
            .or_default()
            .push(signal_number);
        Ok(())
    }

    async fn stats(&self, os_pid: u32) -> Result<ProcessStats, ProcessError> {
        self.inner
            .lock()
            .stats
            .get(&os_pid)
            .copied()
            .ok_or(ProcessError::NotFound(os_pid))
    }
}

struct FakeChildHandle {
    os_pid: u32,
    exit_rx: Option<oneshot::Receiver<RawExit>>,
}

#[async_trait]
impl ChildHandle for FakeChildHandle {
    fn os_pid(&self) -> u32 {
        self.os_pid
    }

    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        None
    }

    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        None
    }

    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        None
    }

    async fn wait(&mut self) -> std::io::Result<RawExit> {
        let default_exit = RawExit {
            exit_status: Some(0),
            term_signal: None,
        };
        match self.exit_rx.take() {
            Some(rx) => Ok(rx.await.unwrap_or(default_exit)),
            None => Ok(default_exit),
        }
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
