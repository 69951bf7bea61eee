// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_and_list_templates_for_a_session() {
    let mut reg = SessionRegistry::new();
    let sid = SessionId::new("alice");
    reg.register(sid.clone(), "alice.web".to_string());
    reg.register(sid.clone(), "alice.worker".to_string());

    let mut names: Vec<&str> = reg.templates(&sid).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["alice.web", "alice.worker"]);
}

#[test]
fn unregister_last_template_drops_the_session() {
    let mut reg = SessionRegistry::new();
    let sid = SessionId::new("bob");
    reg.register(sid.clone(), "bob.web".to_string());
    reg.unregister(&sid, "bob.web");
    assert!(!reg.contains_session(&sid));
    assert_eq!(reg.templates(&sid).count(), 0);
}

#[test]
fn remove_session_returns_all_owned_names() {
    let mut reg = SessionRegistry::new();
    let sid = SessionId::new("carol");
    reg.register(sid.clone(), "carol.a".to_string());
    reg.register(sid.clone(), "carol.b".to_string());

    let removed = reg.remove_session(&sid);
    assert_eq!(removed.len(), 2);
    assert!(!reg.contains_session(&sid));
}

#[test]
fn unknown_session_yields_no_templates() {
    let reg = SessionRegistry::new();
    let sid = SessionId::new("ghost");
    assert_eq!(reg.templates(&sid).count(), 0);
}
