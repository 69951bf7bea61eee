// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Convergence logic: compares desired replica count against running and
//! pending instances and decides what to spawn or terminate (§4.1).
//!
//! Pure decision functions — no I/O, no registry mutation — so the Manager
//! loop can unit test convergence without a real process adapter.

use procd_core::InstanceId;

use crate::registry::{DesiredState, Registry, TemplateEntry};

/// What the loop should do to converge one template toward its desired
/// replica count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvergencePlan {
    /// Number of new instances to spawn.
    pub spawn: usize,
    /// Existing instances to terminate, newest-first (§4.1 LIFO).
    pub terminate: Vec<InstanceId>,
}

/// Compute what's needed to converge `template` toward its desired count.
///
/// `pending_spawns` counts instances already `PENDING`/`SPAWNING` that
/// haven't reached `RUNNING` yet, so repeated reconciler passes don't
/// over-spawn while a spawn is in flight (§4.1 "needed = desired - running
/// - pending_spawns").
pub fn plan(template: &TemplateEntry, registry: &Registry) -> ConvergencePlan {
    if let Some(terminate_all) = draining_or_stopped(template, registry) {
        return terminate_all;
    }
    if template.flapping.is_stopped() {
        return ConvergencePlan::default();
    }
    // A tripped detector defers the replacement spawn to its own timer
    // (§4.3 "defer the next spawn by retry_in"); regular convergence passes
    // (including the per-tick sweep) must not race ahead of that timer.
    if template.flapping.is_retrying() {
        return ConvergencePlan::default();
    }

    spawn_to_target(template, registry)
}

/// Convergence run specifically by a fired `FlappingRetry` timer: the one
/// caller allowed to spawn while `flapping.is_retrying()`, since that timer
/// firing *is* the retry the detector deferred (§4.3).
pub fn plan_flapping_retry(template: &TemplateEntry, registry: &Registry) -> ConvergencePlan {
    if let Some(terminate_all) = draining_or_stopped(template, registry) {
        return terminate_all;
    }
    if template.flapping.is_stopped() {
        return ConvergencePlan::default();
    }

    spawn_to_target(template, registry)
}

fn draining_or_stopped(template: &TemplateEntry, registry: &Registry) -> Option<ConvergencePlan> {
    if template.draining {
        return Some(ConvergencePlan {
            spawn: 0,
            terminate: registry.instances_newest_first(&template.qualified_name),
        });
    }
    if template.desired == DesiredState::Stopped {
        return Some(ConvergencePlan {
            spawn: 0,
            terminate: registry.instances_newest_first(&template.qualified_name),
        });
    }
    None
}

fn spawn_to_target(template: &TemplateEntry, registry: &Registry) -> ConvergencePlan {
    let desired = template.spec.numprocesses as usize;
    let newest_first = registry.instances_newest_first(&template.qualified_name);
    let supervised_count = newest_first
        .iter()
        .filter_map(|id| registry.instance(*id))
        .filter(|e| !e.instance.unsupervised)
        .count();

    if supervised_count < desired {
        ConvergencePlan {
            spawn: desired - supervised_count,
            terminate: vec![],
        }
    } else if supervised_count > desired {
        let excess = supervised_count - desired;
        let terminate = newest_first
            .into_iter()
            .filter(|id| {
                registry
                    .instance(*id)
                    .is_some_and(|e| !e.instance.unsupervised)
            })
            .take(excess)
            .collect();
        ConvergencePlan {
            spawn: 0,
            terminate,
        }
    } else {
        ConvergencePlan::default()
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
