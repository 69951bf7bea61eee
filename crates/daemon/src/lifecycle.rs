// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Much smaller than `oj-daemon::lifecycle`: there is no WAL to replay, no
//! lock file to acquire, and no snapshot to restore, since persistence
//! across restarts is an explicit non-goal (§1). Startup just builds the
//! in-memory stack and binds the control socket.

use std::path::PathBuf;
use std::time::Instant;

use procd_bus::EventEmitter;
use procd_core::SystemClock;
use procd_process::RealProcessAdapter;
use procd_stream::StreamMux;
use procd_supervisor::ManagerHandle;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The running daemon's core collaborators, without the listener (which the
/// caller owns separately so it can be driven from its own task).
pub struct Daemon {
    pub manager: ManagerHandle,
    pub bus: EventEmitter,
    pub start_time: Instant,
    manager_task: JoinHandle<()>,
}

impl Daemon {
    /// Tear down the Manager loop. There's nothing to flush or persist, so
    /// this just stops the task; the process is expected to be exiting.
    pub fn shutdown(self) {
        self.manager_task.abort();
    }
}

pub struct StartupResult {
    pub daemon: Daemon,
    pub listener: UnixListener,
}

/// Build the Manager stack and bind the control socket.
///
/// Removes a stale socket file left behind by a previous run before
/// binding, mirroring how a Unix-domain server conventionally reclaims its
/// own path (there's no lock file here to detect "already running" the way
/// the teacher's `lifecycle::startup` does — a second daemon bound to the
/// same path simply fails to bind instead).
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|source| LifecycleError::Bind {
        path: config.socket_path.clone(),
        source,
    })?;

    let bus = EventEmitter::new();
    let stream_mux = StreamMux::new(bus.clone());
    let process = RealProcessAdapter::new();
    let clock = SystemClock;

    let (manager, manager_task) = procd_supervisor::spawn_with_tick_interval(
        process,
        clock,
        bus.clone(),
        stream_mux,
        config.timer_resolution,
    );

    Ok(StartupResult {
        daemon: Daemon {
            manager,
            bus,
            start_time: Instant::now(),
            manager_task,
        },
        listener,
    })
}
