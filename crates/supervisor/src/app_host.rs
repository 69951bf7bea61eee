// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle hooks for auxiliary long-lived collaborators: HTTP server,
//! webhook dispatcher, plugins (§4.7).
//!
//! Replaces the duck-typed `start/stop/restart` protocol the source exposed
//! with an explicit capability trait (§9 "plugin/application polymorphism"),
//! mirroring how `oj-adapters` keeps its host code oblivious to concrete
//! adapter implementations.

use async_trait::async_trait;

use crate::manager::ManagerHandle;

/// An auxiliary collaborator the [`ApplicationHost`] manages.
///
/// Implementors receive a [`ManagerHandle`] at `start` rather than owning
/// the Manager directly, so the host stays oblivious to which concrete
/// application it's driving.
#[async_trait]
pub trait Application: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self, manager: ManagerHandle) -> Result<(), String>;
    async fn stop(&self);
    async fn restart(&self, manager: ManagerHandle) -> Result<(), String> {
        self.stop().await;
        self.start(manager).await
    }
}

struct Slot {
    app: Box<dyn Application>,
    failed: bool,
}

/// Starts applications after the Manager is live, stops them before the
/// Manager tears instances down. A failed `start` marks the app failed but
/// never aborts the rest of startup (§4.7).
#[derive(Default)]
pub struct ApplicationHost {
    apps: Vec<Slot>,
}

impl ApplicationHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, app: Box<dyn Application>) {
        self.apps.push(Slot { app, failed: false });
    }

    pub async fn start_all(&mut self, manager: ManagerHandle) {
        for slot in &mut self.apps {
            match slot.app.start(manager.clone()).await {
                Ok(()) => slot.failed = false,
                Err(err) => {
                    tracing::warn!(app = slot.app.name(), error = %err, "application failed to start");
                    slot.failed = true;
                }
            }
        }
    }

    pub async fn stop_all(&mut self) {
        for slot in &mut self.apps {
            if !slot.failed {
                slot.app.stop().await;
            }
        }
    }

    pub fn failed_apps(&self) -> Vec<&str> {
        self.apps
            .iter()
            .filter(|s| s.failed)
            .map(|s| s.app.name())
            .collect()
    }
}

#[cfg(test)]
#[path = "app_host_tests.rs"]
mod tests;
