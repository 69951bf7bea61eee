// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use procd_bus::EventEmitter;
use procd_core::{FakeClock, FlappingPolicy, StreamDecl, TemplateSpec, UserRef};
use procd_process::{FakeProcessAdapter, ProcessCall, RawExit};
use procd_stream::StreamMux;

use super::*;

fn spec(name: &str, numprocesses: u32) -> TemplateSpec {
    TemplateSpec {
        name: name.to_string(),
        cmd: "/bin/true".to_string(),
        args: vec![],
        env: HashMap::new(),
        uid: None,
        gid: None,
        cwd: None,
        detach: false,
        shell: false,
        os_env: false,
        numprocesses,
        priority: 0,
        flapping: FlappingPolicy::default(),
        streams: StreamDecl::default(),
        graceful_timeout: Duration::from_secs(30),
    }
}

struct Harness {
    handle: ManagerHandle,
    process: FakeProcessAdapter,
    clock: FakeClock,
    bus: EventEmitter,
}

fn start() -> Harness {
    let process = FakeProcessAdapter::new();
    let clock = FakeClock::new();
    let bus = EventEmitter::new();
    let stream_mux = StreamMux::new(bus.clone());
    let (handle, _join) = spawn(process.clone(), clock.clone(), bus.clone(), stream_mux);
    Harness {
        handle,
        process,
        clock,
        bus,
    }
}

/// Advance both the logical clock the Manager reasons with and tokio's
/// paused virtual clock, so the stats/timer tick inside the loop actually
/// fires in step with it.
async fn advance(h: &Harness, dur: Duration) {
    h.clock.advance(dur);
    tokio::time::advance(dur).await;
}

#[tokio::test(start_paused = true)]
async fn loading_a_template_spawns_to_numprocesses() {
    let h = start();
    h.handle
        .load_template("sess", spec("web", 2))
        .await
        .expect("load");
    tokio::task::yield_now().await;

    let instances = h.handle.list_instances().await;
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|i| i.template == "sess.web"));
}

#[tokio::test(start_paused = true)]
async fn loading_a_duplicate_qualified_name_is_rejected() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    let err = h.handle.load_template("sess", spec("web", 1)).await.unwrap_err();
    assert_eq!(err, ManagerError::AlreadyExists("sess.web".to_string()));
}

#[tokio::test(start_paused = true)]
async fn scale_up_spawns_additional_instances() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;

    let count = h.handle.scale("sess.web", ScaleOp::Absolute(3)).await.unwrap();
    tokio::task::yield_now().await;

    assert_eq!(count, 3);
    assert_eq!(h.handle.list_instances().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn scale_down_terminates_newest_first() {
    let h = start();
    h.handle.load_template("sess", spec("web", 3)).await.unwrap();
    tokio::task::yield_now().await;

    let before = h.handle.list_instances().await;
    assert_eq!(before.len(), 3);

    h.handle.scale("sess.web", ScaleOp::Absolute(1)).await.unwrap();
    tokio::task::yield_now().await;

    // The two newest instances were asked to stop (SIGTERM delivered);
    // none have actually exited yet since the fake process hasn't been
    // told to complete.
    let after = h.handle.list_instances().await;
    let terminating = after
        .iter()
        .filter(|i| matches!(i.state, procd_core::InstanceState::Terminating { .. }))
        .count();
    assert_eq!(terminating, 2);
}

#[tokio::test(start_paused = true)]
async fn commit_spawns_an_unsupervised_instance_outside_numprocesses() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;

    let id = h
        .handle
        .commit("sess.web", HashMap::new(), None)
        .await
        .expect("commit");
    tokio::task::yield_now().await;

    let instances = h.handle.list_instances().await;
    assert_eq!(instances.len(), 2);
    let committed = instances.iter().find(|i| i.id == id).expect("committed instance");
    assert!(committed.unsupervised);

    // Scaling to zero must not touch the unsupervised instance.
    h.handle.scale("sess.web", ScaleOp::Absolute(0)).await.unwrap();
    tokio::task::yield_now().await;
    let after = h.handle.list_instances().await;
    assert!(after.iter().any(|i| i.id == id));
}

#[tokio::test(start_paused = true)]
async fn stop_sends_sigterm_and_marks_instances_terminating() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;

    h.handle.stop("sess.web").await.unwrap();
    tokio::task::yield_now().await;

    let instances = h.handle.list_instances().await;
    assert_eq!(instances.len(), 1);
    assert!(matches!(
        instances[0].state,
        procd_core::InstanceState::Terminating { .. }
    ));
    let os_pid = match instances[0].state {
        procd_core::InstanceState::Terminating { os_pid } => os_pid,
        _ => unreachable!(),
    };
    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM]);
}

#[tokio::test(start_paused = true)]
async fn stop_instance_sends_sigterm_to_one_instance_without_touching_its_siblings() {
    let h = start();
    h.handle.load_template("sess", spec("web", 2)).await.unwrap();
    tokio::task::yield_now().await;

    let instances = h.handle.list_instances().await;
    assert_eq!(instances.len(), 2);
    let target = instances[0].id;
    let other = instances[1].id;

    h.handle.stop_instance(target).await.unwrap();
    tokio::task::yield_now().await;

    let after = h.handle.list_instances().await;
    let target_state = after.iter().find(|i| i.id == target).unwrap().state.clone();
    let other_state = after.iter().find(|i| i.id == other).unwrap().state.clone();
    assert!(matches!(
        target_state,
        procd_core::InstanceState::Terminating { .. }
    ));
    assert!(matches!(
        other_state,
        procd_core::InstanceState::Running { .. }
    ));
    let os_pid = match target_state {
        procd_core::InstanceState::Terminating { os_pid } => os_pid,
        _ => unreachable!(),
    };
    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM]);
}

#[tokio::test(start_paused = true)]
async fn stop_instance_escalates_to_forced_kill_after_its_graceful_timeout() {
    let h = start();
    let mut s = spec("web", 1);
    s.graceful_timeout = Duration::from_secs(5);
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    let id = h.handle.list_instances().await[0].id;
    let os_pid = match h.handle.list_instances().await[0].state {
        procd_core::InstanceState::Running { os_pid } => os_pid,
        _ => unreachable!("expected a running instance"),
    };

    h.handle.stop_instance(id).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM]);

    advance(&h, Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM, SIGKILL]);
}

#[tokio::test(start_paused = true)]
async fn stop_instance_rejects_an_unknown_id() {
    let h = start();
    let err = h
        .handle
        .stop_instance(procd_core::InstanceId(99999))
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn a_global_start_converges_templates_in_priority_order() {
    let h = start();
    let mut a = spec("a", 1);
    a.cmd = "/bin/true-a".to_string();
    a.priority = 1;
    let mut b = spec("b", 1);
    b.cmd = "/bin/true-b".to_string();
    b.priority = 0;
    h.handle.load_template("sess", a).await.unwrap();
    h.handle.load_template("sess", b).await.unwrap();
    tokio::task::yield_now().await;

    h.handle.set_state(None, StateOp::Stop).await.unwrap();
    tokio::task::yield_now().await;
    let baseline = h.process.calls().len();

    h.handle.set_state(None, StateOp::Start).await.unwrap();
    tokio::task::yield_now().await;

    let spawn_order: Vec<String> = h.process.calls()[baseline..]
        .iter()
        .filter_map(|c| match c {
            procd_process::ProcessCall::Spawn { cmd, .. } => Some(cmd.clone()),
            _ => None,
        })
        .collect();
    let b_pos = spawn_order.iter().position(|c| c == "/bin/true-b").unwrap();
    let a_pos = spawn_order.iter().position(|c| c == "/bin/true-a").unwrap();
    assert!(b_pos < a_pos, "priority 0 template b should spawn before priority 1 template a: {spawn_order:?}");
}

#[tokio::test(start_paused = true)]
async fn graceful_timeout_escalates_to_forced_kill() {
    let h = start();
    let mut s = spec("web", 1);
    s.graceful_timeout = Duration::from_secs(5);
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    let os_pid = match h.handle.list_instances().await[0].state {
        procd_core::InstanceState::Running { os_pid } => os_pid,
        _ => unreachable!("expected a running instance"),
    };

    h.handle.stop("sess.web").await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM]);

    advance(&h, Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    assert_eq!(h.process.signals_received(os_pid), vec![SIGTERM, SIGKILL]);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_forced_kill_is_released_after_its_grace_period() {
    let h = start();
    let mut s = spec("web", 1);
    s.graceful_timeout = Duration::from_secs(1);
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    h.handle.stop("sess.web").await.unwrap();
    tokio::task::yield_now().await;

    // Past the graceful timeout: escalates to SIGKILL.
    advance(&h, Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(h.handle.list_instances().await.len() == 1);

    // Past the forced-kill grace period, with the fake process never
    // actually exiting: the instance is released anyway.
    advance(&h, FORCED_KILL_GRACE + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(h.handle.list_instances().await.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn an_expected_clean_exit_is_not_counted_as_flapping() {
    let h = start();
    let mut s = spec("web", 1);
    s.flapping = FlappingPolicy {
        attempts: 1,
        window: Duration::from_secs(60),
        retry_in: Duration::from_secs(5),
        max_retry: 1,
    };
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    let os_pid = match h.handle.list_instances().await[0].state {
        procd_core::InstanceState::Running { os_pid } => os_pid,
        _ => unreachable!(),
    };
    h.handle.stop("sess.web").await.unwrap();
    tokio::task::yield_now().await;
    h.process.complete(
        os_pid,
        RawExit {
            exit_status: Some(0),
            term_signal: None,
        },
    );
    tokio::task::yield_now().await;

    // The template wasn't marked stopped-by-flapping; scaling back up
    // still works normally.
    h.handle.start(None).await.unwrap();
    let count = h.handle.scale("sess.web", ScaleOp::Absolute(1)).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(count, 1);
    assert_eq!(h.handle.list_instances().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_unexpected_exits_trip_flapping_and_eventually_stop() {
    let h = start();
    let mut s = spec("crashy", 1);
    s.flapping = FlappingPolicy {
        attempts: 1,
        window: Duration::from_secs(60),
        retry_in: Duration::from_secs(1),
        max_retry: 1,
    };
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    for _ in 0..3 {
        let os_pid = match h.handle.list_instances().await.first().map(|i| i.state.clone()) {
            Some(procd_core::InstanceState::Running { os_pid }) => Some(os_pid),
            _ => None,
        };
        if let Some(os_pid) = os_pid {
            h.process.complete(
                os_pid,
                RawExit {
                    exit_status: Some(1),
                    term_signal: None,
                },
            );
        }
        advance(&h, Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
    }

    // Retries are exhausted (max_retry == 1): the template should have
    // converged to zero running supervised instances.
    let templates = h.handle.list_templates().await;
    let web = templates.iter().find(|t| t.qualified_name == "sess.crashy").unwrap();
    assert_eq!(web.running, 0);
}

#[tokio::test(start_paused = true)]
async fn flapping_retries_are_spaced_by_retry_in_and_stop_at_max_retry() {
    let h = start();
    let mut s = spec("crashy", 1);
    s.flapping = FlappingPolicy {
        attempts: 1,
        window: Duration::from_secs(60),
        retry_in: Duration::from_secs(3),
        max_retry: 2,
    };
    h.handle.load_template("sess", s).await.unwrap();
    tokio::task::yield_now().await;

    fn spawn_count(h: &Harness) -> usize {
        h.process
            .calls()
            .iter()
            .filter(|c| matches!(c, ProcessCall::Spawn { .. }))
            .count()
    }

    assert_eq!(spawn_count(&h), 1);
    let mut os_pid = match h.handle.list_instances().await.first().map(|i| i.state.clone()) {
        Some(procd_core::InstanceState::Running { os_pid }) => os_pid,
        _ => unreachable!("initial instance should be running"),
    };

    // Two retries are permitted (max_retry == 2); each must wait the full
    // retry_in before the replacement spawns, never sooner.
    for _ in 0..2 {
        let before = spawn_count(&h);
        h.process.complete(
            os_pid,
            RawExit {
                exit_status: Some(1),
                term_signal: None,
            },
        );
        tokio::task::yield_now().await;
        assert_eq!(spawn_count(&h), before, "retry spawned immediately on exit");

        // Short of retry_in: still deferred.
        advance(&h, Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(spawn_count(&h), before, "retry spawned before retry_in elapsed");

        // Past retry_in: the FlappingRetry timer fires and spawns the
        // replacement.
        advance(&h, Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(spawn_count(&h), before + 1, "retry did not spawn after retry_in elapsed");

        os_pid = match h.handle.list_instances().await.first().map(|i| i.state.clone()) {
            Some(procd_core::InstanceState::Running { os_pid }) => os_pid,
            _ => unreachable!("retry should have spawned a running instance"),
        };
    }

    // The second retry's own exit exhausts max_retry: no third spawn, the
    // template converges to stopped-by-flapping instead.
    let before = spawn_count(&h);
    h.process.complete(
        os_pid,
        RawExit {
            exit_status: Some(1),
            term_signal: None,
        },
    );
    advance(&h, Duration::from_secs(5)).await;
    tokio::task::yield_now().await;
    assert_eq!(spawn_count(&h), before, "spawned again after retries were exhausted");

    let templates = h.handle.list_templates().await;
    let web = templates.iter().find(|t| t.qualified_name == "sess.crashy").unwrap();
    assert_eq!(web.running, 0);
}

#[tokio::test(start_paused = true)]
async fn unloading_a_template_terminates_everything_and_removes_it() {
    let h = start();
    h.handle.load_template("sess", spec("web", 2)).await.unwrap();
    tokio::task::yield_now().await;

    h.handle.unload_template("sess.web").await.unwrap();
    tokio::task::yield_now().await;

    for instance in h.handle.list_instances().await {
        if let procd_core::InstanceState::Running { os_pid } = instance.state {
            h.process.complete(
                os_pid,
                RawExit {
                    exit_status: Some(0),
                    term_signal: None,
                },
            );
        }
    }
    tokio::task::yield_now().await;

    let templates = h.handle.list_templates().await;
    assert!(templates.iter().all(|t| t.qualified_name != "sess.web"));
}

#[tokio::test(start_paused = true)]
async fn signal_delivers_to_every_instance_of_a_template() {
    let h = start();
    h.handle.load_template("sess", spec("web", 2)).await.unwrap();
    tokio::task::yield_now().await;

    h.handle
        .signal(SignalTarget::Template("sess.web".to_string()), 1)
        .await
        .unwrap();
    tokio::task::yield_now().await;

    for instance in h.handle.list_instances().await {
        if let procd_core::InstanceState::Running { os_pid } = instance.state {
            assert!(h.process.signals_received(os_pid).contains(&1));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_uid_name_is_reported_as_an_invalid_spec() {
    let h = start();
    let mut s = spec("web", 1);
    s.uid = Some(UserRef::Name("definitely-not-a-real-user".to_string()));
    let result = h.handle.load_template("sess", s).await;
    assert!(result.is_ok(), "load_template itself only validates the spec shape");

    // The spawn that follows from convergence fails; this manifests as the
    // instance never reaching RUNNING.
    tokio::task::yield_now().await;
    let instances = h.handle.list_instances().await;
    assert!(instances.is_empty() || instances.iter().all(|i| !matches!(
        i.state,
        procd_core::InstanceState::Running { .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn scale_delta_is_relative_to_the_current_target() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;
    let got = h.handle.scale("sess.web", ScaleOp::Delta(2)).await.unwrap();
    assert_eq!(got, 3);
}

#[tokio::test(start_paused = true)]
async fn scale_absolute_sets_the_target_directly() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;
    let got = h.handle.scale("sess.web", ScaleOp::Absolute(5)).await.unwrap();
    assert_eq!(got, 5);
}

#[tokio::test(start_paused = true)]
async fn write_stdin_rejects_an_unknown_pid() {
    let h = start();
    let err = h.handle.write_stdin(99999, b"hi".to_vec()).await.unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn write_stdin_rejects_an_instance_with_no_stdin_pipe() {
    let h = start();
    h.handle.load_template("sess", spec("web", 1)).await.unwrap();
    tokio::task::yield_now().await;
    let instances = h.handle.list_instances().await;
    let os_pid = match instances[0].state {
        procd_core::InstanceState::Running { os_pid } => os_pid,
        _ => unreachable!("instance should be running"),
    };
    // FakeProcessAdapter never hands back a stdin pipe, regardless of
    // `redirect_input`, so this always exercises the no-stdin path.
    let err = h.handle.write_stdin(os_pid, b"hi".to_vec()).await.unwrap_err();
    assert!(matches!(err, ManagerError::InvalidState(_)));
}
