// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal control-socket listener (§6).
//!
//! Grounded on `oj-daemon::listener::{Listener, ListenCtx, handle_connection,
//! handle_request}`: accept in a loop, spawn one task per connection, read
//! one length-prefixed request and write one length-prefixed response.
//! Unlike the teacher there's no WAL and no durable event log — requests
//! are dispatched straight onto the Manager's command channel.

use std::time::Duration;
use std::time::Instant;

use procd_bus::{EventEmitter, OverflowPolicy};
use procd_core::TemplateSpec;
use procd_protocol::{self, ProtocolError, Request, Response, StateSpec};
use procd_supervisor::{ManagerError, ManagerHandle, ScaleOp, SignalTarget, StateOp};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

/// Shared context handed to every connection-handling task.
pub struct ListenCtx {
    pub manager: ManagerHandle,
    pub bus: EventEmitter,
    pub default_graceful_timeout: Duration,
    pub start_time: Instant,
}

/// Accepts connections and spawns one task per connection.
pub struct Listener {
    socket: UnixListener,
    ctx: std::sync::Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: std::sync::Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = std::sync::Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, &ctx).await {
                            match err {
                                ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                ProtocolError::Timeout => warn!("connection timed out"),
                                other => error!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                Err(err) => error!(error = %err, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = procd_protocol::read_request(&mut reader, procd_protocol::DEFAULT_TIMEOUT).await?;
    debug!(request = ?request, "received request");
    let response = handle_request(request, ctx).await;
    procd_protocol::write_response(&mut writer, &response, procd_protocol::DEFAULT_TIMEOUT).await
}

fn manager_error_response(err: ManagerError) -> Response {
    let conflict = matches!(
        err,
        ManagerError::AlreadyExists(_) | ManagerError::Flapping | ManagerError::InvalidState(_)
    );
    Response::Error {
        message: err.to_string(),
        conflict,
    }
}

/// Resolve a `SpecJson`'s template, applying the daemon's configured
/// default `graceful_timeout` when the client didn't set one explicitly
/// (§2a — this is the one place that default actually takes effect, since
/// by the time a bare `TemplateSpec` exists the distinction between "unset"
/// and "set to the default" is already gone).
fn resolve_spec(spec: procd_protocol::SpecJson, ctx: &ListenCtx) -> TemplateSpec {
    let explicit = spec.graceful_timeout;
    let mut template: TemplateSpec = spec.into();
    if explicit.is_none() {
        template.graceful_timeout = ctx.default_graceful_timeout;
    }
    template
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Version => Response::Version {
            version: procd_protocol::PROTOCOL_VERSION.to_string(),
        },
        Request::NodeInfo => Response::NodeInfo {
            version: procd_protocol::PROTOCOL_VERSION.to_string(),
            uptime_secs: ctx.start_time.elapsed().as_secs(),
        },

        Request::ListSessions => {
            let templates = ctx.manager.list_templates().await;
            let mut sessions: Vec<String> = templates
                .iter()
                .filter_map(|t| procd_core::split_scoped_name(&t.qualified_name).map(|(s, _)| s.to_string()))
                .collect();
            sessions.sort();
            sessions.dedup();
            Response::Sessions { sessions }
        }

        Request::ListJobs { session } => {
            let templates = ctx.manager.list_templates().await;
            let jobs = templates
                .into_iter()
                .filter(|t| {
                    session.as_deref().is_none_or(|s| {
                        procd_core::split_scoped_name(&t.qualified_name)
                            .is_some_and(|(sess, _)| sess == s)
                    })
                })
                .map(|t| t.qualified_name)
                .collect();
            Response::Jobs { jobs }
        }

        Request::GetJob { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            let job = find_template(ctx, &qname).await.map(|t| {
                Box::new(procd_protocol::response::JobSummary {
                    session: session.clone(),
                    name: name.clone(),
                    qualified_name: t.qualified_name,
                    numprocesses: t.spec.numprocesses,
                    running: t.running,
                    draining: t.draining,
                    spec: t.spec.into(),
                })
            });
            Response::Job { job }
        }

        Request::LoadTemplate { session, spec } => {
            if let Err(err) = spec.validate() {
                return Response::Error {
                    message: err.to_string(),
                    conflict: false,
                };
            }
            let template = resolve_spec(spec, ctx);
            match ctx.manager.load_template(session, template).await {
                Ok(_) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::UpdateTemplate { session, name, spec } => {
            if let Err(err) = spec.validate() {
                return Response::Error {
                    message: err.to_string(),
                    conflict: false,
                };
            }
            let qname = procd_core::scoped_name(&session, &name);
            let template = resolve_spec(spec, ctx);
            match ctx.manager.update_template(qname, template).await {
                Ok(()) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::UnloadTemplate { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            match ctx.manager.unload_template(qname).await {
                Ok(()) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::GetNumProcesses { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            match find_template(ctx, &qname).await {
                Some(t) => Response::NumProcesses {
                    numprocesses: t.spec.numprocesses,
                },
                None => not_found(&qname),
            }
        }

        Request::Scale { session, name, scale } => {
            let qname = procd_core::scoped_name(&session, &name);
            let op = match scale {
                procd_protocol::ScaleSpec::Delta(d) => ScaleOp::Delta(d),
                procd_protocol::ScaleSpec::Absolute(n) => ScaleOp::Absolute(n),
            };
            match ctx.manager.scale(qname, op).await {
                Ok(numprocesses) => Response::NumProcesses { numprocesses },
                Err(err) => manager_error_response(err),
            }
        }

        Request::GetState { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            match find_template(ctx, &qname).await {
                Some(t) => Response::State {
                    state: if t.desired == procd_supervisor::DesiredState::Started {
                        1
                    } else {
                        0
                    },
                },
                None => not_found(&qname),
            }
        }

        Request::SetState { session, name, state } => {
            let qname = match (&session, &name) {
                (Some(s), Some(n)) => Some(procd_core::scoped_name(s, n)),
                _ => None,
            };
            let op = match state {
                StateSpec::Stop => StateOp::Stop,
                StateSpec::Start => StateOp::Start,
                StateSpec::Reload => StateOp::Reload,
            };
            match ctx.manager.set_state(qname, op).await {
                Ok(()) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::SignalTemplate { session, name, signal } => {
            let qname = procd_core::scoped_name(&session, &name);
            match ctx
                .manager
                .signal(SignalTarget::Template(qname), signal)
                .await
            {
                Ok(()) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::GetTemplateStats { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            match ctx.manager.get_stats(qname).await {
                Ok(snapshots) => {
                    let stats: Vec<_> = snapshots
                        .iter()
                        .map(|s| procd_protocol::response::StatsEntry {
                            instance: s.instance,
                            os_pid: s.os_pid,
                            cpu_percent: s.stats.cpu_percent,
                            rss_bytes: s.stats.rss_bytes,
                            vsz_bytes: s.stats.vsz_bytes,
                        })
                        .collect();
                    let cpu_percent = stats.iter().map(|s| s.cpu_percent).sum();
                    let rss_bytes = stats.iter().map(|s| s.rss_bytes).sum();
                    Response::Stats {
                        cpu_percent,
                        rss_bytes,
                        stats,
                    }
                }
                Err(err) => manager_error_response(err),
            }
        }

        Request::GetTemplatePids { session, name } => {
            let qname = procd_core::scoped_name(&session, &name);
            let instances = ctx.manager.list_instances().await;
            let pids = instances
                .into_iter()
                .filter(|i| i.template == qname)
                .map(|i| i.id)
                .collect();
            Response::Pids { pids }
        }

        Request::Commit {
            session,
            name,
            env,
            graceful_timeout,
        } => {
            let qname = procd_core::scoped_name(&session, &name);
            let timeout = graceful_timeout.map(|secs| Duration::from_secs_f64(secs.max(0.0)));
            match ctx.manager.commit(qname, env, timeout).await {
                Ok(pid) => Response::Committed { pid },
                Err(err) => manager_error_response(err),
            }
        }

        Request::ListInstances => {
            let instances = ctx.manager.list_instances().await.into_iter().map(summarize).collect();
            Response::Instances { instances }
        }

        Request::GetInstance { instance } => {
            let found = ctx
                .manager
                .list_instances()
                .await
                .into_iter()
                .find(|i| i.id == instance)
                .map(|i| Box::new(summarize(i)));
            Response::Instance { instance: found }
        }

        Request::StopInstance { instance } => match ctx.manager.stop_instance(instance).await {
            Ok(()) => Response::Ok,
            Err(err) => manager_error_response(err),
        },

        Request::SignalInstance { instance, signal } => {
            match ctx.manager.signal(SignalTarget::Instance(instance), signal).await {
                Ok(()) => Response::Ok,
                Err(err) => manager_error_response(err),
            }
        }

        Request::GetInstanceStats { instance } => {
            let found = ctx
                .manager
                .list_instances()
                .await
                .into_iter()
                .find(|i| i.id == instance);
            let Some(found) = found else {
                return not_found(&instance.to_string());
            };
            match ctx.manager.get_stats(found.template.clone()).await {
                Ok(snapshots) => {
                    let stats = snapshots
                        .into_iter()
                        .find(|s| s.instance == instance)
                        .map(|s| procd_protocol::response::StatsEntry {
                            instance: s.instance,
                            os_pid: s.os_pid,
                            cpu_percent: s.stats.cpu_percent,
                            rss_bytes: s.stats.rss_bytes,
                            vsz_bytes: s.stats.vsz_bytes,
                        });
                    Response::InstanceStats { stats }
                }
                Err(err) => manager_error_response(err),
            }
        }

        Request::WriteStdin { os_pid, data } => match ctx.manager.write_stdin(os_pid, data).await {
            Ok(()) => Response::Ok,
            Err(err) => manager_error_response(err),
        },

        Request::Watch { pattern, feed: _, heartbeat } => {
            // The internal protocol is a single request/single response
            // cycle (§6 scope note): it waits for one matching event and
            // returns, rather than streaming. Feed-specific text framing
            // lives in `procd_protocol::feed` for the external transport.
            let heartbeat = heartbeat.map(Duration::from_secs_f64);
            let subscription = ctx.bus.subscribe(pattern, 16, OverflowPolicy::DropOldest, heartbeat);
            match subscription.recv().await {
                Some(delivered) => Response::WatchEvent {
                    topic: delivered.topic,
                    event: delivered.event,
                },
                None => Response::Error {
                    message: "subscription closed before an event arrived".to_string(),
                    conflict: false,
                },
            }
        }
    }
}

fn not_found(what: &str) -> Response {
    Response::Error {
        message: format!("not found: {what}"),
        conflict: false,
    }
}

async fn find_template(ctx: &ListenCtx, qname: &str) -> Option<procd_supervisor::TemplateInfo> {
    ctx.manager
        .list_templates()
        .await
        .into_iter()
        .find(|t| t.qualified_name == qname)
}

fn summarize(i: procd_supervisor::InstanceInfo) -> procd_protocol::response::InstanceSummary {
    procd_protocol::response::InstanceSummary {
        instance: i.id,
        template: i.template,
        state: state_name(&i.state),
        os_pid: i.state.os_pid(),
        unsupervised: i.unsupervised,
    }
}

fn state_name(state: &procd_core::InstanceState) -> String {
    match state {
        procd_core::InstanceState::Pending => "pending",
        procd_core::InstanceState::Spawning => "spawning",
        procd_core::InstanceState::Running { .. } => "running",
        procd_core::InstanceState::Terminating { .. } => "terminating",
        procd_core::InstanceState::Exited(_) => "exited",
        procd_core::InstanceState::SpawnFailed { .. } => "spawn_failed",
    }
    .to_string()
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
