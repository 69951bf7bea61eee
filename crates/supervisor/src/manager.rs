// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Manager: public API, command-channel loop, and convergence wiring
//! (§4.1).
//!
//! A cloneable [`ManagerHandle`] serializes calls onto a single-consumer
//! command channel processed by [`Loop`], mirroring the teacher's
//! Listener-task -> EventBus -> engine-loop split
//! (`oj-daemon::listener` feeding `oj-daemon::event_bus` into the loop in
//! `oj-daemon::main`). Unlike the teacher there is no WAL: persistence
//! across restarts is an explicit non-goal, so commands mutate the
//! in-memory registry directly instead of going through durable storage.

use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;

use procd_bus::EventEmitter;
use procd_core::{
    resolve_environment, scoped_name, substitute_vars, validate_spec, Clock,
    Event, ExitStatus, InstanceId, InstanceIdGen, InstanceState, ProcessInstance, ReapedKind,
    StopReason, TemplateSpec, UserRef,
};
use procd_process::{ProcessAdapter, ProcessStats, RawExit, SpawnRequest};
use procd_stream::{StdinMux, StreamMux};
use tokio::sync::{mpsc, oneshot};

use crate::error::ManagerError;
use crate::flapping_detector::{self, FlappingAction};
use crate::reconcile;
use crate::registry::{DesiredState, InstanceEntry, InstanceResources, Registry, TemplateEntry};
use crate::scheduler::{
    flapping_retry_timer_id, forced_kill_grace_timer_id, graceful_timeout_timer_id,
    instance_timer_prefix, Scheduler, TimerKind,
};

/// Bounded wait after a forced kill before an unresponsive instance is
/// released anyway (§8: "no instance remains in TERMINATING longer than
/// `graceful_timeout + forced_kill_grace`").
const FORCED_KILL_GRACE: Duration = Duration::from_secs(5);

const STATS_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

/// `numprocesses` delta/absolute adjustment (§6 `{scale:"+N"|"-N"|"=N"}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOp {
    Delta(i64),
    Absolute(u32),
}

/// `signal(qname|pid, signalNumber)` target (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalTarget {
    Template(String),
    Instance(InstanceId),
}

/// Desired-state toggle for `start`/`stop`/`reload` (§4.1, §6 `state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    Stop,
    Start,
    Reload,
}

#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub qualified_name: String,
    pub spec: TemplateSpec,
    pub desired: DesiredState,
    pub draining: bool,
    pub running: usize,
}

#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub template: String,
    pub state: InstanceState,
    pub unsupervised: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub instance: InstanceId,
    pub os_pid: u32,
    pub stats: ProcessStats,
}

type Reply<T> = oneshot::Sender<Result<T, ManagerError>>;

enum Command {
    LoadTemplate {
        session: String,
        spec: TemplateSpec,
        reply: Reply<String>,
    },
    UpdateTemplate {
        qname: String,
        spec: TemplateSpec,
        reply: Reply<()>,
    },
    UnloadTemplate {
        qname: String,
        reply: Reply<()>,
    },
    Scale {
        qname: String,
        op: ScaleOp,
        reply: Reply<u32>,
    },
    SetState {
        qname: Option<String>,
        op: StateOp,
        reply: Reply<()>,
    },
    Signal {
        target: SignalTarget,
        signal_number: i32,
        reply: Reply<()>,
    },
    WriteStdin {
        os_pid: u32,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    StopInstance {
        instance: InstanceId,
        reply: Reply<()>,
    },
    Commit {
        qname: String,
        override_env: HashMap<String, String>,
        graceful_timeout: Option<Duration>,
        reply: Reply<InstanceId>,
    },
    ListTemplates {
        reply: oneshot::Sender<Vec<TemplateInfo>>,
    },
    ListInstances {
        reply: oneshot::Sender<Vec<InstanceInfo>>,
    },
    GetStats {
        qname: String,
        reply: Reply<Vec<StatsSnapshot>>,
    },
    Monitor {
        qname: String,
        reply: Reply<()>,
    },
    Unmonitor {
        qname: String,
        reply: Reply<()>,
    },
    ChildExited {
        instance: InstanceId,
        raw: RawExit,
    },
    Tick,
}

/// Cloneable front door to a running Manager loop.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<Command>,
}

impl ManagerHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ManagerError::LoopGone)?;
        rx.await.map_err(|_| ManagerError::LoopGone)?
    }

    pub async fn load_template(
        &self,
        session: impl Into<String>,
        spec: TemplateSpec,
    ) -> Result<String, ManagerError> {
        let session = session.into();
        self.call(|reply| Command::LoadTemplate {
            session,
            spec,
            reply,
        })
        .await
    }

    pub async fn update_template(
        &self,
        qname: impl Into<String>,
        spec: TemplateSpec,
    ) -> Result<(), ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::UpdateTemplate { qname, spec, reply })
            .await
    }

    pub async fn unload_template(&self, qname: impl Into<String>) -> Result<(), ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::UnloadTemplate { qname, reply })
            .await
    }

    pub async fn scale(&self, qname: impl Into<String>, op: ScaleOp) -> Result<u32, ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::Scale { qname, op, reply }).await
    }

    /// Apply a start/stop/reload to one template, or to every loaded
    /// template when `qname` is `None` (§4.1, §6 `state` with no name).
    pub async fn set_state(&self, qname: Option<String>, op: StateOp) -> Result<(), ManagerError> {
        self.call(|reply| Command::SetState { qname, op, reply }).await
    }

    pub async fn start(&self, qname: Option<String>) -> Result<(), ManagerError> {
        self.set_state(qname, StateOp::Start).await
    }

    pub async fn stop(&self, qname: impl Into<String>) -> Result<(), ManagerError> {
        self.set_state(Some(qname.into()), StateOp::Stop).await
    }

    pub async fn reload(&self, qname: impl Into<String>) -> Result<(), ManagerError> {
        self.set_state(Some(qname.into()), StateOp::Reload).await
    }

    pub async fn signal(
        &self,
        target: SignalTarget,
        signal_number: i32,
    ) -> Result<(), ManagerError> {
        self.call(|reply| Command::Signal {
            target,
            signal_number,
            reply,
        })
        .await
    }

    /// Stop one instance by id, identified directly rather than through its
    /// template (§6 `DELETE /<pid>`). Runs the same graceful-termination
    /// lifecycle as a template-level stop: SIGTERM now, `Terminating` state,
    /// escalating to SIGKILL only if `graceful_timeout` elapses (§4.5).
    pub async fn stop_instance(&self, instance: InstanceId) -> Result<(), ManagerError> {
        self.call(|reply| Command::StopInstance { instance, reply })
            .await
    }

    /// Write to a running instance's stdin, identified by its OS pid (§4.5,
    /// §6 `POST /streams/<pid>/stdin`). Requires the template to have
    /// declared `redirect_input` (§3); the instance must also be running.
    pub async fn write_stdin(&self, os_pid: u32, data: Vec<u8>) -> Result<(), ManagerError> {
        self.call(|reply| Command::WriteStdin {
            os_pid,
            data,
            reply,
        })
        .await
    }

    pub async fn commit(
        &self,
        qname: impl Into<String>,
        override_env: HashMap<String, String>,
        graceful_timeout: Option<Duration>,
    ) -> Result<InstanceId, ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::Commit {
            qname,
            override_env,
            graceful_timeout,
            reply,
        })
        .await
    }

    pub async fn list_templates(&self) -> Vec<TemplateInfo> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::ListTemplates { reply })
            .await
            .is_err()
        {
            return vec![];
        }
        rx.await.unwrap_or_default()
    }

    pub async fn list_instances(&self) -> Vec<InstanceInfo> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::ListInstances { reply })
            .await
            .is_err()
        {
            return vec![];
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get_stats(
        &self,
        qname: impl Into<String>,
    ) -> Result<Vec<StatsSnapshot>, ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::GetStats { qname, reply }).await
    }

    pub async fn monitor(&self, qname: impl Into<String>) -> Result<(), ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::Monitor { qname, reply }).await
    }

    pub async fn unmonitor(&self, qname: impl Into<String>) -> Result<(), ManagerError> {
        let qname = qname.into();
        self.call(|reply| Command::Unmonitor { qname, reply })
            .await
    }
}

fn resolve_uid(r: &UserRef) -> Result<u32, ManagerError> {
    match r {
        UserRef::Id(id) => Ok(*id),
        UserRef::Name(name) => nix::unistd::User::from_name(name)
            .map_err(|e| ManagerError::InvalidSpec {
                field: "uid".to_string(),
                reason: e.to_string(),
            })?
            .map(|u| u.uid.as_raw())
            .ok_or_else(|| ManagerError::InvalidSpec {
                field: "uid".to_string(),
                reason: format!("unknown user '{name}'"),
            }),
    }
}

fn resolve_gid(r: &UserRef) -> Result<u32, ManagerError> {
    match r {
        UserRef::Id(id) => Ok(*id),
        UserRef::Name(name) => nix::unistd::Group::from_name(name)
            .map_err(|e| ManagerError::InvalidSpec {
                field: "gid".to_string(),
                reason: e.to_string(),
            })?
            .map(|g| g.gid.as_raw())
            .ok_or_else(|| ManagerError::InvalidSpec {
                field: "gid".to_string(),
                reason: format!("unknown group '{name}'"),
            }),
    }
}

/// Fields that trigger a terminate-then-respawn on `updateTemplate`
/// (§9 open question (i): "always respawn on any material field change").
fn materially_changed(old: &TemplateSpec, new: &TemplateSpec) -> bool {
    old.cmd != new.cmd
        || old.args != new.args
        || old.env != new.env
        || old.uid != new.uid
        || old.gid != new.gid
        || old.cwd != new.cwd
        || old.shell != new.shell
        || old.os_env != new.os_env
        || old.streams != new.streams
}

/// The single-consumer loop owning all registry state (§5).
pub struct Loop<P: ProcessAdapter, C: Clock> {
    registry: Registry,
    scheduler: Scheduler,
    bus: EventEmitter,
    stream_mux: StreamMux,
    process: P,
    clock: C,
    id_gen: InstanceIdGen,
    monitored: HashSet<String>,
    rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<Command>,
    tick_interval: Duration,
}

impl<P: ProcessAdapter, C: Clock> Loop<P, C> {
    /// Construct the loop and its handle but don't start running yet;
    /// callers own when/how the loop task is spawned.
    pub fn new(process: P, clock: C, bus: EventEmitter, stream_mux: StreamMux) -> (Self, ManagerHandle) {
        let (tx, rx) = mpsc::channel(256);
        let loop_ = Self {
            registry: Registry::new(),
            scheduler: Scheduler::new(),
            bus,
            stream_mux,
            process,
            clock,
            id_gen: InstanceIdGen::new(),
            monitored: HashSet::new(),
            rx,
            tx: tx.clone(),
            tick_interval: STATS_SAMPLE_INTERVAL,
        };
        (loop_, ManagerHandle { tx })
    }

    /// Override the stats-sample/timer-check cadence (default
    /// [`STATS_SAMPLE_INTERVAL`]). Exposed so `procd-daemon`'s `Config` can
    /// make it operator-tunable without every caller needing to care.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.handle(Command::Tick).await;
                }
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::LoadTemplate {
                session,
                spec,
                reply,
            } => {
                let _ = reply.send(self.load_template(session, spec).await);
            }
            Command::UpdateTemplate { qname, spec, reply } => {
                let _ = reply.send(self.update_template(&qname, spec).await);
            }
            Command::UnloadTemplate { qname, reply } => {
                let _ = reply.send(self.unload_template(&qname).await);
            }
            Command::Scale { qname, op, reply } => {
                let _ = reply.send(self.scale(&qname, op).await);
            }
            Command::SetState { qname, op, reply } => {
                let _ = reply.send(self.set_state(qname, op).await);
            }
            Command::Signal {
                target,
                signal_number,
                reply,
            } => {
                let _ = reply.send(self.signal(target, signal_number).await);
            }
            Command::WriteStdin {
                os_pid,
                data,
                reply,
            } => {
                let _ = reply.send(self.write_stdin(os_pid, data).await);
            }
            Command::StopInstance { instance, reply } => {
                let _ = reply.send(self.stop_instance(instance).await);
            }
            Command::Commit {
                qname,
                override_env,
                graceful_timeout,
                reply,
            } => {
                let _ = reply.send(
                    self.commit(&qname, override_env, graceful_timeout)
                        .await,
                );
            }
            Command::ListTemplates { reply } => {
                let _ = reply.send(self.list_templates());
            }
            Command::ListInstances { reply } => {
                let _ = reply.send(self.list_instances());
            }
            Command::GetStats { qname, reply } => {
                let _ = reply.send(self.get_stats(&qname).await);
            }
            Command::Monitor { qname, reply } => {
                let _ = reply.send(self.monitor(&qname));
            }
            Command::Unmonitor { qname, reply } => {
                let _ = reply.send(self.unmonitor(&qname));
            }
            Command::ChildExited { instance, raw } => {
                self.on_child_exited(instance, raw).await;
            }
            Command::Tick => {
                self.on_tick().await;
            }
        }
    }

    fn list_templates(&self) -> Vec<TemplateInfo> {
        self.registry
            .all_templates()
            .map(|t| {
                let running = self
                    .registry
                    .instances_newest_first(&t.qualified_name)
                    .into_iter()
                    .filter_map(|id| self.registry.instance(id))
                    .filter(|e| !e.instance.unsupervised && !e.instance.state.is_terminal())
                    .count();
                TemplateInfo {
                    qualified_name: t.qualified_name.clone(),
                    spec: t.spec.clone(),
                    desired: t.desired,
                    draining: t.draining,
                    running,
                }
            })
            .collect()
    }

    fn list_instances(&self) -> Vec<InstanceInfo> {
        self.registry
            .all_instances()
            .map(|e| InstanceInfo {
                id: e.instance.id,
                template: e.instance.template.clone(),
                state: e.instance.state.clone(),
                unsupervised: e.instance.unsupervised,
            })
            .collect()
    }

    async fn load_template(
        &mut self,
        session: String,
        spec: TemplateSpec,
    ) -> Result<String, ManagerError> {
        validate_spec(&spec).map_err(|e| ManagerError::InvalidSpec {
            field: "spec".to_string(),
            reason: e.to_string(),
        })?;
        let qname = scoped_name(&session, &spec.name);
        if self.registry.contains_template(&qname) {
            return Err(ManagerError::AlreadyExists(qname));
        }
        let entry = TemplateEntry {
            qualified_name: qname.clone(),
            session,
            flapping: procd_core::FlappingWindow::new(spec.flapping),
            spec,
            registered_at: self.clock.now(),
            desired: DesiredState::Started,
            draining: false,
            instance_order: vec![],
        };
        self.registry.insert_template(entry);
        self.bus.publish(Event::Create {
            template: qname.clone(),
        });
        self.converge(&qname).await;
        Ok(qname)
    }

    async fn update_template(
        &mut self,
        qname: &str,
        new_spec: TemplateSpec,
    ) -> Result<(), ManagerError> {
        validate_spec(&new_spec).map_err(|e| ManagerError::InvalidSpec {
            field: "spec".to_string(),
            reason: e.to_string(),
        })?;
        let respawn = {
            let entry = self
                .registry
                .template(qname)
                .ok_or_else(|| ManagerError::NotFound(qname.to_string()))?;
            materially_changed(&entry.spec, &new_spec)
        };
        if let Some(entry) = self.registry.template_mut(qname) {
            entry.spec = new_spec;
        }
        self.bus.publish(Event::Update {
            template: qname.to_string(),
        });
        if respawn {
            let ids = self.registry.instances_newest_first(qname);
            for id in ids {
                self.begin_terminate(id, StopReason::Requested).await;
            }
        }
        self.converge(qname).await;
        Ok(())
    }

    async fn unload_template(&mut self, qname: &str) -> Result<(), ManagerError> {
        let entry = self
            .registry
            .template_mut(qname)
            .ok_or_else(|| ManagerError::NotFound(qname.to_string()))?;
        entry.draining = true;
        self.bus.publish(Event::Delete {
            template: qname.to_string(),
        });
        self.converge(qname).await;
        if self
            .registry
            .template(qname)
            .is_some_and(|t| t.instance_order.is_empty())
        {
            self.registry.remove_template(qname);
        }
        Ok(())
    }

    async fn scale(&mut self, qname: &str, op: ScaleOp) -> Result<u32, ManagerError> {
        let new_count = {
            let entry = self
                .registry
                .template_mut(qname)
                .ok_or_else(|| ManagerError::NotFound(qname.to_string()))?;
            let current = entry.spec.numprocesses as i64;
            let updated = match op {
                ScaleOp::Delta(d) => (current + d).max(0),
                ScaleOp::Absolute(n) => n as i64,
            };
            entry.spec.numprocesses = updated as u32;
            entry.spec.numprocesses
        };
        self.converge(qname).await;
        Ok(new_count)
    }

    async fn set_state(
        &mut self,
        qname: Option<String>,
        op: StateOp,
    ) -> Result<(), ManagerError> {
        let targets: Vec<String> = match &qname {
            Some(q) => {
                if !self.registry.contains_template(q) {
                    return Err(ManagerError::NotFound(q.clone()));
                }
                vec![q.clone()]
            }
            None => self
                .registry
                .templates_by_priority()
                .into_iter()
                .map(|t| t.qualified_name.clone())
                .collect(),
        };

        match op {
            StateOp::Stop => {
                for q in &targets {
                    if let Some(entry) = self.registry.template_mut(q) {
                        if entry.desired == DesiredState::Stopped {
                            continue;
                        }
                        entry.desired = DesiredState::Stopped;
                    }
                    self.bus.publish(Event::Stop {
                        template: q.clone(),
                    });
                    self.converge(q).await;
                }
            }
            StateOp::Start => {
                for q in &targets {
                    if let Some(entry) = self.registry.template_mut(q) {
                        entry.desired = DesiredState::Started;
                        entry.flapping.reset();
                    }
                    self.bus.publish(Event::Start {
                        template: q.clone(),
                    });
                    self.converge(q).await;
                }
            }
            StateOp::Reload => {
                for q in &targets {
                    self.bus.publish(Event::Restart {
                        template: q.clone(),
                    });
                    let ids = self.registry.instances_newest_first(q);
                    for id in ids {
                        self.begin_terminate(id, StopReason::Requested).await;
                    }
                    if let Some(entry) = self.registry.template_mut(q) {
                        entry.desired = DesiredState::Started;
                        entry.flapping.reset();
                    }
                    self.converge(q).await;
                }
            }
        }
        Ok(())
    }

    async fn signal(
        &mut self,
        target: SignalTarget,
        signal_number: i32,
    ) -> Result<(), ManagerError> {
        let ids: Vec<InstanceId> = match target {
            SignalTarget::Instance(id) => vec![id],
            SignalTarget::Template(qname) => self.registry.instances_newest_first(&qname),
        };
        for id in ids {
            let os_pid = self.registry.instance(id).and_then(|e| e.instance.state.os_pid());
            if let Some(os_pid) = os_pid {
                let _ = self.process.signal(os_pid, signal_number).await;
            }
        }
        Ok(())
    }

    async fn write_stdin(&mut self, os_pid: u32, data: Vec<u8>) -> Result<(), ManagerError> {
        let id = self
            .registry
            .all_instances()
            .find(|e| e.instance.state.os_pid() == Some(os_pid))
            .map(|e| e.instance.id)
            .ok_or_else(|| ManagerError::NotFound(format!("pid {os_pid}")))?;
        let stdin = self
            .registry
            .instance(id)
            .and_then(|e| e.resources.stdin.as_ref())
            .ok_or_else(|| ManagerError::InvalidState(format!("pid {os_pid} has no stdin")))?;
        stdin
            .write(data)
            .await
            .map_err(|e| ManagerError::InvalidState(e.to_string()))
    }

    async fn stop_instance(&mut self, id: InstanceId) -> Result<(), ManagerError> {
        if self.registry.instance(id).is_none() {
            return Err(ManagerError::NotFound(id.to_string()));
        }
        self.begin_terminate(id, StopReason::Requested).await;
        Ok(())
    }

    async fn commit(
        &mut self,
        qname: &str,
        override_env: HashMap<String, String>,
        graceful_timeout: Option<Duration>,
    ) -> Result<InstanceId, ManagerError> {
        let mut spec = self
            .registry
            .template(qname)
            .ok_or_else(|| ManagerError::NotFound(qname.to_string()))?
            .spec
            .clone();
        if let Some(timeout) = graceful_timeout {
            spec.graceful_timeout = timeout;
        }
        self.spawn_instance(qname, &spec, Some(override_env), true)
            .await
    }

    fn monitor(&mut self, qname: &str) -> Result<(), ManagerError> {
        if !self.registry.contains_template(qname) {
            return Err(ManagerError::NotFound(qname.to_string()));
        }
        self.monitored.insert(qname.to_string());
        Ok(())
    }

    fn unmonitor(&mut self, qname: &str) -> Result<(), ManagerError> {
        self.monitored.remove(qname);
        Ok(())
    }

    async fn get_stats(&mut self, qname: &str) -> Result<Vec<StatsSnapshot>, ManagerError> {
        if !self.registry.contains_template(qname) {
            return Err(ManagerError::NotFound(qname.to_string()));
        }
        let ids = self.registry.instances_newest_first(qname);
        let mut out = Vec::new();
        for id in ids {
            if let Some(os_pid) = self.registry.instance(id).and_then(|e| e.instance.state.os_pid()) {
                if let Ok(stats) = self.process.stats(os_pid).await {
                    out.push(StatsSnapshot {
                        instance: id,
                        os_pid,
                        stats,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Run convergence for one template: spawn/terminate to reach the
    /// desired replica count (§4.1 "internal reconciler").
    async fn converge(&mut self, qname: &str) {
        let plan = match self.registry.template(qname) {
            Some(entry) => reconcile::plan(entry, &self.registry),
            None => return,
        };
        for id in plan.terminate {
            self.begin_terminate(id, StopReason::Requested).await;
        }
        if plan.spawn > 0 {
            let spec = match self.registry.template(qname) {
                Some(entry) => entry.spec.clone(),
                None => return,
            };
            for _ in 0..plan.spawn {
                if let Err(err) = self.spawn_instance(qname, &spec, None, false).await {
                    tracing::warn!(qname, %err, "spawn failed during convergence");
                }
            }
        }
        if let Some(entry) = self.registry.template(qname) {
            if entry.draining && entry.instance_order.is_empty() {
                self.registry.remove_template(qname);
            }
        }
    }

    /// Convergence run by a fired `FlappingRetry` timer: the one caller
    /// allowed to spawn while the template's detector is still `Retrying`,
    /// since the timer firing *is* the deferred retry (§4.3).
    async fn converge_flapping_retry(&mut self, qname: &str) {
        let plan = match self.registry.template(qname) {
            Some(entry) => reconcile::plan_flapping_retry(entry, &self.registry),
            None => return,
        };
        for id in plan.terminate {
            self.begin_terminate(id, StopReason::Requested).await;
        }
        if plan.spawn > 0 {
            let spec = match self.registry.template(qname) {
                Some(entry) => entry.spec.clone(),
                None => return,
            };
            for _ in 0..plan.spawn {
                if let Err(err) = self.spawn_instance(qname, &spec, None, false).await {
                    tracing::warn!(qname, %err, "spawn failed during flapping retry");
                }
            }
        }
    }

    async fn spawn_instance(
        &mut self,
        qname: &str,
        spec: &TemplateSpec,
        override_env: Option<HashMap<String, String>>,
        unsupervised: bool,
    ) -> Result<InstanceId, ManagerError> {
        // Resolve everything that can fail before the instance is visible
        // in the registry at all, so a bad uid/gid name never leaves a
        // dangling SPAWNING entry behind (§4.1 `loadTemplate`/`commit`
        // return `InvalidSpec` synchronously for these failures).
        let os_env_vars: HashMap<String, String> = if spec.os_env {
            std::env::vars().collect()
        } else {
            HashMap::new()
        };
        let mut resolved = resolve_environment(spec.os_env, &os_env_vars, &spec.env);
        if let Some(ov) = &override_env {
            resolved.extend(ov.clone());
        }
        let cmd = substitute_vars(&spec.cmd, &resolved);
        let args: Vec<String> = spec.args.iter().map(|a| substitute_vars(a, &resolved)).collect();

        let uid = match &spec.uid {
            Some(r) => Some(resolve_uid(r)?),
            None => None,
        };
        let gid = match &spec.gid {
            Some(r) => Some(resolve_gid(r)?),
            None => None,
        };

        let labels = spec.streams.effective_labels();
        let req = SpawnRequest {
            cmd,
            args,
            env: resolved,
            cwd: spec.cwd.clone(),
            uid,
            gid,
            shell: spec.shell,
            capture_stdout: !labels.is_empty(),
            capture_stderr: !labels.is_empty(),
            capture_stdin: spec.streams.redirect_input,
        };

        let id = self.id_gen.next();
        let mut instance = ProcessInstance::new(id, qname.to_string(), self.clock.now(), unsupervised);
        instance.state = InstanceState::Spawning;
        self.registry.insert_instance(InstanceEntry {
            instance,
            resources: InstanceResources::default(),
        });

        match self.process.spawn(req).await {
            Ok(mut child) => {
                let os_pid = child.os_pid();
                let mut resources = InstanceResources::default();

                if spec.streams.merges_stderr() {
                    let label = labels[0].clone();
                    if let Some(out) = child.take_stdout() {
                        resources
                            .streams
                            .push(self.stream_mux.spawn_output_stream(os_pid, label.clone(), out));
                    }
                    if let Some(err) = child.take_stderr() {
                        resources
                            .streams
                            .push(self.stream_mux.spawn_output_stream(os_pid, label, err));
                    }
                } else {
                    if let (Some(label), Some(out)) = (labels.first(), child.take_stdout()) {
                        resources
                            .streams
                            .push(self.stream_mux.spawn_output_stream(os_pid, label.clone(), out));
                    }
                    if let (Some(label), Some(err)) = (labels.get(1), child.take_stderr()) {
                        resources
                            .streams
                            .push(self.stream_mux.spawn_output_stream(os_pid, label.clone(), err));
                    }
                }
                if spec.streams.redirect_input {
                    if let Some(writer) = child.take_stdin() {
                        resources.stdin = Some(StdinMux::new(
                            writer,
                            procd_stream::DEFAULT_STDIN_QUEUE_DEPTH,
                        ));
                    }
                }
                // The wait task takes ownership of the child handle so it
                // can await exit independently; `resources.child` stays
                // `None` once an instance is running.
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let raw = child.wait().await.unwrap_or(RawExit {
                        exit_status: None,
                        term_signal: None,
                    });
                    let _ = tx.send(Command::ChildExited { instance: id, raw }).await;
                });

                if let Some(entry) = self.registry.instance_mut(id) {
                    entry.instance.state = InstanceState::Running { os_pid };
                    entry.resources = resources;
                }

                self.bus.publish(Event::Spawn {
                    template: qname.to_string(),
                    instance: id,
                    os_pid,
                });
                Ok(id)
            }
            Err(err) => {
                let message = err.to_string();
                if let Some(entry) = self.registry.instance_mut(id) {
                    entry.instance.state = InstanceState::SpawnFailed {
                        message: message.clone(),
                    };
                }
                self.bus.publish(Event::SpawnError {
                    template: qname.to_string(),
                    instance: id,
                    message: message.clone(),
                });
                self.registry.remove_instance(id);
                if !unsupervised {
                    if let Some(entry) = self.registry.template_mut(qname) {
                        let now = self.clock.now();
                        let action =
                            flapping_detector::record_unexpected_exit(entry, &mut self.scheduler, now);
                        self.handle_flapping_action(qname, action);
                    }
                }
                Err(ManagerError::SpawnError(message))
            }
        }
    }

    fn handle_flapping_action(&mut self, qname: &str, action: FlappingAction) {
        match action {
            FlappingAction::StoppedFlapping => {
                if let Some(entry) = self.registry.template_mut(qname) {
                    entry.desired = DesiredState::Stopped;
                }
                self.bus.publish(Event::StoppedFlapping {
                    template: qname.to_string(),
                });
            }
            FlappingAction::SpawnNow | FlappingAction::Deferred | FlappingAction::AlreadyStopped => {}
        }
    }

    /// Begin terminating an instance: graceful signal now, forced-kill
    /// escalation timer armed (§4.1, §4.4).
    async fn begin_terminate(&mut self, id: InstanceId, reason: StopReason) {
        let (os_pid, graceful_timeout, qname) = match self.registry.instance(id) {
            Some(entry) => match entry.instance.state.os_pid() {
                Some(pid) => {
                    let timeout = self
                        .registry
                        .template(&entry.instance.template)
                        .map(|t| t.spec.graceful_timeout)
                        .unwrap_or(procd_core::DEFAULT_GRACEFUL_TIMEOUT);
                    (pid, timeout, entry.instance.template.clone())
                }
                None => return,
            },
            None => return,
        };

        // Re-arming the timer below on a second stop call is idempotent:
        // it just resets the deadline rather than stacking escalations.
        if let Some(entry) = self.registry.instance_mut(id) {
            entry.instance.state = InstanceState::Terminating { os_pid };
            entry.instance.stop_reason = reason;
            entry.instance.stop_requested_at = Some(self.clock.now());
        }

        let _ = self.process.signal(os_pid, SIGTERM).await;
        self.bus.publish(Event::StopPid {
            template: qname,
            instance: id,
            os_pid,
        });
        self.scheduler.set_timer(
            graceful_timeout_timer_id(id.get()),
            graceful_timeout,
            self.clock.now(),
            TimerKind::GracefulTimeout { instance: id.get() },
        );
    }

    async fn escalate_to_forced_kill(&mut self, instance: u64) {
        let id = InstanceId(instance);
        let os_pid = self.registry.instance(id).and_then(|e| e.instance.state.os_pid());
        if let Some(os_pid) = os_pid {
            let _ = self.process.signal(os_pid, SIGKILL).await;
            self.scheduler.set_timer(
                forced_kill_grace_timer_id(instance),
                FORCED_KILL_GRACE,
                self.clock.now(),
                TimerKind::ForcedKillGrace { instance },
            );
        }
    }

    /// The forced-kill grace period elapsed and the process still hasn't
    /// been reaped; release the instance anyway so it doesn't linger
    /// forever (§8 bounded-TERMINATING invariant).
    async fn force_release(&mut self, instance: u64) {
        let id = InstanceId(instance);
        if let Some(entry) = self.registry.instance(id) {
            if entry.instance.state.is_terminal() {
                return;
            }
        } else {
            return;
        }
        let exit = ExitStatus {
            exit_status: None,
            term_signal: Some(SIGKILL),
            reaped: ReapedKind::Forced,
        };
        self.finish_exit(id, exit).await;
    }

    async fn on_child_exited(&mut self, id: InstanceId, raw: RawExit) {
        let (was_terminating, stop_requested_at, graceful_timeout) = match self.registry.instance(id) {
            Some(entry) => {
                let terminating = matches!(entry.instance.state, InstanceState::Terminating { .. });
                let timeout = self
                    .registry
                    .template(&entry.instance.template)
                    .map(|t| t.spec.graceful_timeout)
                    .unwrap_or(procd_core::DEFAULT_GRACEFUL_TIMEOUT);
                (terminating, entry.instance.stop_requested_at, timeout)
            }
            None => return,
        };

        let reaped = if was_terminating {
            let elapsed = stop_requested_at
                .map(|at| self.clock.now().saturating_duration_since(at) > graceful_timeout)
                .unwrap_or(false);
            if elapsed {
                ReapedKind::Forced
            } else {
                ReapedKind::Graceful
            }
        } else {
            ReapedKind::Normal
        };

        let exit = ExitStatus {
            exit_status: raw.exit_status,
            term_signal: raw.term_signal,
            reaped,
        };
        self.finish_exit(id, exit).await;
    }

    async fn finish_exit(&mut self, id: InstanceId, exit: ExitStatus) {
        let Some(entry) = self.registry.instance_mut(id) else {
            return;
        };
        entry.instance.state = InstanceState::Exited(exit);
        for stream in &entry.resources.streams {
            stream.abort();
        }
        if let Some(stdin) = &entry.resources.stdin {
            stdin.abort();
        }
        let qname = entry.instance.template.clone();
        let unsupervised = entry.instance.unsupervised;
        let graceful_timeout_elapsed = matches!(exit.reaped, ReapedKind::Forced);
        let unexpected = entry.instance.is_unexpected_exit(&exit, graceful_timeout_elapsed);

        self.scheduler.cancel_timers_with_prefix(&instance_timer_prefix(id.get()));

        self.bus.publish(Event::Exit {
            template: qname.clone(),
            instance: id,
            exit,
        });
        self.bus.publish(Event::Reap {
            template: qname.clone(),
            instance: id,
            exit,
        });

        self.registry.remove_instance(id);

        if !unsupervised && unexpected {
            if let Some(entry) = self.registry.template_mut(&qname) {
                let now = self.clock.now();
                let action = flapping_detector::record_unexpected_exit(entry, &mut self.scheduler, now);
                self.handle_flapping_action(&qname, action);
            }
        } else if let Some(entry) = self.registry.template_mut(&qname) {
            // A deliberate stop that ran its full course counts as a
            // long-lived run for flapping-reset purposes only when the
            // template wasn't already mid-retry; trivial successes don't
            // otherwise touch the window.
            if !entry.flapping.is_retrying() {
                entry.flapping.record_long_lived();
            }
        }

        self.converge(&qname).await;
    }

    async fn on_tick(&mut self) {
        let now = self.clock.now();
        let fired = self.scheduler.fired_timers(now);
        for kind in fired {
            match kind {
                TimerKind::FlappingRetry { template } => {
                    self.converge_flapping_retry(&template).await;
                }
                TimerKind::GracefulTimeout { instance } => {
                    self.escalate_to_forced_kill(instance).await;
                }
                TimerKind::ForcedKillGrace { instance } => {
                    self.force_release(instance).await;
                }
            }
        }
        // A template with no flapping policy configured should keep
        // retrying a failing spawn without ever arming a deferred-retry
        // timer; the tick is what throttles those retries instead of a
        // tight loop inside a single convergence pass.
        let qnames: Vec<String> = self
            .registry
            .all_templates()
            .map(|t| t.qualified_name.clone())
            .collect();
        for qname in qnames {
            self.converge(&qname).await;
        }
        self.sample_stats().await;
    }

    async fn sample_stats(&mut self) {
        let candidates: Vec<(InstanceId, u32)> = self
            .registry
            .all_instances()
            .filter_map(|e| {
                e.instance
                    .state
                    .os_pid()
                    .map(|pid| (e.instance.id, pid))
            })
            .filter(|(_, os_pid)| {
                !self.monitored.is_empty()
                    || self.bus.has_matching_subscriber(&format!("stats.{os_pid}"))
            })
            .collect();

        for (id, os_pid) in candidates {
            let is_monitored = self
                .registry
                .instance(id)
                .map(|e| self.monitored.contains(&e.instance.template))
                .unwrap_or(false);
            if !is_monitored && !self.bus.has_matching_subscriber(&format!("stats.{os_pid}")) {
                continue;
            }
            if let Ok(stats) = self.process.stats(os_pid).await {
                self.bus.publish(Event::Stats {
                    os_pid,
                    cpu_percent: stats.cpu_percent,
                    rss_bytes: stats.rss_bytes,
                    vsz_bytes: stats.vsz_bytes,
                });
            }
        }
    }
}

/// Spawn a Manager loop on the current Tokio runtime and return its
/// handle plus a join handle for shutdown coordination.
pub fn spawn<P: ProcessAdapter, C: Clock>(
    process: P,
    clock: C,
    bus: EventEmitter,
    stream_mux: StreamMux,
) -> (ManagerHandle, tokio::task::JoinHandle<()>) {
    let (loop_, handle) = Loop::new(process, clock, bus, stream_mux);
    let join = tokio::spawn(loop_.run());
    (handle, join)
}

/// Like [`spawn`], but with an explicit stats-sample/timer-check cadence.
pub fn spawn_with_tick_interval<P: ProcessAdapter, C: Clock>(
    process: P,
    clock: C,
    bus: EventEmitter,
    stream_mux: StreamMux,
    tick_interval: Duration,
) -> (ManagerHandle, tokio::task::JoinHandle<()>) {
    let (loop_, handle) = Loop::new(process, clock, bus, stream_mux);
    let loop_ = loop_.with_tick_interval(tick_interval);
    let join = tokio::spawn(loop_.run());
    (handle, join)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
