// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `procd`, the process supervision daemon.
//!
//! Architecture:
//! - Listener task: owns the control socket, dispatches one request per
//!   connection onto the Manager's command channel.
//! - Manager loop: single-consumer task owning all mutable supervision
//!   state (templates, instances, timers).
//!
//! Much smaller than `ojd`'s main: there's no WAL to replay, no lock file
//! to acquire, and no checkpoint/flush tasks to spawn, since persistence
//! across restarts is an explicit non-goal.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use procd_daemon::config::Config;
use procd_daemon::lifecycle::{self, StartupResult};
use procd_daemon::listener::{ListenCtx, Listener};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("procd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("procd {}", env!("CARGO_PKG_VERSION"));
                println!("Process supervision daemon");
                println!();
                println!("USAGE:");
                println!("    procd");
                println!();
                println!("procd listens on a Unix socket for commands from its control");
                println!("clients and is not meant to be driven directly from a terminal.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: procd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load();
    setup_logging(&config.log_level);

    info!("starting procd");

    let StartupResult { daemon, listener: unix_listener } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "failed to start procd");
            return Err(err.into());
        }
    };

    let ctx = Arc::new(ListenCtx {
        manager: daemon.manager.clone(),
        bus: daemon.bus.clone(),
        default_graceful_timeout: config.default_graceful_timeout,
        start_time: daemon.start_time,
    });
    tokio::spawn(Listener::new(unix_listener, ctx).run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "procd ready");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    daemon.shutdown();
    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
