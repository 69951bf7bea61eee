// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use procd_core::{Event, InstanceId};

use super::*;

#[test]
fn error_response_round_trips_the_conflict_flag() {
    let resp = Response::Error {
        message: "already exists".to_string(),
        conflict: true,
    };
    let json = serde_json::to_string(&resp).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(back, resp);
}

#[test]
fn instance_summary_serializes_the_instance_id_as_a_plain_number() {
    let summary = InstanceSummary {
        instance: InstanceId(7),
        template: "sid.web".to_string(),
        state: "running".to_string(),
        os_pid: Some(1234),
        unsupervised: false,
    };
    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["instance"], serde_json::json!(7));
}

#[test]
fn pids_response_lists_bare_instance_ids() {
    let resp = Response::Pids {
        pids: vec![InstanceId(1), InstanceId(2)],
    };
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value["pids"], serde_json::json!([1, 2]));
}

#[test]
fn watch_event_round_trips_the_underlying_event() {
    let resp = Response::WatchEvent {
        topic: "proc.sid.web.spawn".to_string(),
        event: Event::Spawn {
            template: "sid.web".to_string(),
            instance: InstanceId(3),
            os_pid: 4242,
        },
    };
    let json = serde_json::to_string(&resp).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(back, resp);
}
