// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Wires `procd-core`'s pure policy types, `procd-process`'s OS adapter,
//! and `procd-stream`'s stdio plumbing into the running Manager (§4.1-§4.7).
//!
//! The Manager itself is a command-channel loop (see [`manager`]) so its
//! public operations can be called concurrently from many tasks (the HTTP
//! listener, the CLI, timers) while all registry mutation stays confined
//! to a single consumer task (§5).

pub mod app_host;
pub mod error;
pub mod flapping_detector;
pub mod manager;
pub mod reconcile;
pub mod registry;
pub mod scheduler;

pub use app_host::{Application, ApplicationHost};
pub use error::ManagerError;
pub use flapping_detector::FlappingAction;
pub use manager::{
    spawn, spawn_with_tick_interval, InstanceInfo, Loop, ManagerHandle, ScaleOp, SignalTarget,
    StateOp, StatsSnapshot, TemplateInfo,
};
pub use reconcile::{plan, plan_flapping_retry, ConvergencePlan};
pub use registry::{DesiredState, InstanceEntry, InstanceResources, Registry, TemplateEntry};
pub use scheduler::{Scheduler, TimerKind};
