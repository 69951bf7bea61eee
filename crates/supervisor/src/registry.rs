// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory template and instance registries owned by the Manager loop
//! (§3, §5: "the template/instance registries are owned by the Manager;
//! mutation is confined to the loop thread").

use std::collections::HashMap;
use std::time::Instant;

use procd_core::{FlappingWindow, InstanceId, ProcessInstance, SessionRegistry, TemplateSpec};
use procd_process::ChildHandle;
use procd_stream::{StdinMux, StreamHandle};

/// Whether a template's desired state is to be running (`start`) or
/// quiesced (`stop`) (§6 `state` endpoint: `0|1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Stopped,
    Started,
}

/// OS-facing resources an instance owns once it has spawned. Held
/// separately from [`ProcessInstance`] so the pure state machine in
/// `procd-core` stays free of trait objects and runtime types.
#[derive(Default)]
pub struct InstanceResources {
    pub child: Option<Box<dyn ChildHandle>>,
    pub streams: Vec<StreamHandle>,
    pub stdin: Option<StdinMux>,
}

pub struct InstanceEntry {
    pub instance: ProcessInstance,
    pub resources: InstanceResources,
}

/// Everything the Manager tracks for one loaded template.
pub struct TemplateEntry {
    pub spec: TemplateSpec,
    pub session: String,
    pub qualified_name: String,
    pub registered_at: Instant,
    pub desired: DesiredState,
    pub draining: bool,
    pub flapping: FlappingWindow,
    /// Instance ids in spawn order, oldest first — the most-recently
    /// spawned is the back of this vec (§4.1 scale-down is LIFO).
    pub instance_order: Vec<InstanceId>,
}

impl TemplateEntry {
    pub fn running_count(&self, instances: &HashMap<InstanceId, InstanceEntry>) -> usize {
        self.instance_order
            .iter()
            .filter_map(|id| instances.get(id))
            .filter(|entry| {
                !entry.instance.unsupervised
                    && !entry.instance.state.is_terminal()
            })
            .count()
    }
}

/// Owns all template and instance state for one Manager.
#[derive(Default)]
pub struct Registry {
    templates: HashMap<String, TemplateEntry>,
    instances: HashMap<InstanceId, InstanceEntry>,
    pub sessions: SessionRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_template(&mut self, entry: TemplateEntry) {
        self.sessions.register(
            procd_core::SessionId::new(entry.session.clone()),
            entry.qualified_name.clone(),
        );
        self.templates.insert(entry.qualified_name.clone(), entry);
    }

    pub fn remove_template(&mut self, qname: &str) -> Option<TemplateEntry> {
        let entry = self.templates.remove(qname)?;
        self.sessions.unregister(
            &procd_core::SessionId::new(entry.session.clone()),
            qname,
        );
        Some(entry)
    }

    pub fn template(&self, qname: &str) -> Option<&TemplateEntry> {
        self.templates.get(qname)
    }

    pub fn template_mut(&mut self, qname: &str) -> Option<&mut TemplateEntry> {
        self.templates.get_mut(qname)
    }

    pub fn contains_template(&self, qname: &str) -> bool {
        self.templates.contains_key(qname)
    }

    /// All templates ordered ascending by `priority`, ties broken by
    /// registration order (§4.1 "spawn order is stable by registration
    /// time").
    pub fn templates_by_priority(&self) -> Vec<&TemplateEntry> {
        let mut all: Vec<&TemplateEntry> = self.templates.values().collect();
        all.sort_by(|a, b| {
            a.spec
                .priority
                .cmp(&b.spec.priority)
                .then_with(|| a.registered_at.cmp(&b.registered_at))
        });
        all
    }

    pub fn all_templates(&self) -> impl Iterator<Item = &TemplateEntry> {
        self.templates.values()
    }

    pub fn insert_instance(&mut self, entry: InstanceEntry) {
        let id = entry.instance.id;
        let qname = entry.instance.template.clone();
        if let Some(t) = self.templates.get_mut(&qname) {
            t.instance_order.push(id);
        }
        self.instances.insert(id, entry);
    }

    pub fn instance(&self, id: InstanceId) -> Option<&InstanceEntry> {
        self.instances.get(&id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut InstanceEntry> {
        self.instances.get_mut(&id)
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> Option<InstanceEntry> {
        let entry = self.instances.remove(&id)?;
        if let Some(t) = self.templates.get_mut(&entry.instance.template) {
            t.instance_order.retain(|i| *i != id);
        }
        Some(entry)
    }

    pub fn all_instances(&self) -> impl Iterator<Item = &InstanceEntry> {
        self.instances.values()
    }

    /// Instances of `qname` newest-first, for LIFO scale-down (§4.1).
    pub fn instances_newest_first(&self, qname: &str) -> Vec<InstanceId> {
        self.templates
            .get(qname)
            .map(|t| t.instance_order.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    pub fn find_by_os_pid(&self, os_pid: u32) -> Option<InstanceId> {
        self.instances
            .values()
            .find(|e| e.instance.state.os_pid() == Some(os_pid))
            .map(|e| e.instance.id)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
