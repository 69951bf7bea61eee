// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real OS-backed process adapter, built on `tokio::process` and `nix`.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::adapter::{ChildHandle, ProcessAdapter, ProcessStats, RawExit, SpawnRequest};
use crate::error::ProcessError;
use crate::stats::read_process_stats;

/// Adapter that actually forks/execs and signals real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealProcessAdapter;

impl RealProcessAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessAdapter for RealProcessAdapter {
    async fn spawn(&self, req: SpawnRequest) -> Result<Box<dyn ChildHandle>, ProcessError> {
        let mut command = if req.shell {
            let mut c = Command::new("/bin/sh");
            c.arg("-c");
            let mut full = req.cmd.clone();
            for arg in &req.args {
                full.push(' ');
                full.push_str(arg);
            }
            c.arg(full);
            c
        } else {
            let mut c = Command::new(&req.cmd);
            c.args(&req.args);
            c
        };

        command.env_clear();
        command.envs(&req.env);
        if let Some(cwd) = &req.cwd {
            command.current_dir(cwd);
        }
        if let Some(uid) = req.uid {
            command.uid(uid);
        }
        if let Some(gid) = req.gid {
            command.gid(gid);
        }
        command.stdin(if req.capture_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(if req.capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stderr(if req.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.kill_on_drop(false);

        let child = command
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        Ok(Box::new(RealChildHandle { child }))
    }

    async fn signal(&self, os_pid: u32, signal_number: i32) -> Result<(), ProcessError> {
        let signal =
            Signal::try_from(signal_number).map_err(|_| ProcessError::InvalidSignal(signal_number))?;
        kill(Pid::from_raw(os_pid as i32), signal).map_err(|e| {
            ProcessError::SignalFailed(std::io::Error::from_raw_os_error(e as i32))
        })
    }

    async fn stats(&self, os_pid: u32) -> Result<ProcessStats, ProcessError> {
        read_process_stats(os_pid)
    }
}

struct RealChildHandle {
    child: Child,
}

#[async_trait]
impl ChildHandle for RealChildHandle {
    fn os_pid(&self) -> u32 {
        self.child.id().unwrap_or(0)
    }

    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn wait(&mut self) -> std::io::Result<RawExit> {
        let status = self.child.wait().await?;
        Ok(RawExit {
            exit_status: status.code(),
            term_signal: status.signal(),
        })
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

#[cfg(test)]
#[path = "real_tests.rs"]
mod tests;
