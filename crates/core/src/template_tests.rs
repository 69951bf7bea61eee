// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spec(name: &str) -> TemplateSpec {
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
        numprocesses: 1,
        priority: 0,
        flapping: FlappingPolicy::default(),
        streams: StreamDecl::default(),
        graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
    }
}

#[test]
fn valid_name_accepted() {
    assert!(validate_name("web-1_worker").is_ok());
}

#[test]
fn name_with_dot_rejected() {
    assert_eq!(
        validate_name("app.web"),
        Err(TemplateSpecError::InvalidName("app.web".to_string()))
    );
}

#[test]
fn empty_cmd_rejected() {
    let mut s = spec("w");
    s.cmd = "   ".to_string();
    assert_eq!(validate_spec(&s), Err(TemplateSpecError::EmptyCmd));
}

#[test]
fn three_output_labels_rejected() {
    let mut s = spec("w");
    s.streams.redirect_output = vec!["a".into(), "b".into(), "c".into()];
    assert_eq!(
        validate_spec(&s),
        Err(TemplateSpecError::TooManyOutputLabels { max: 2, got: 3 })
    );
}

#[test]
fn distinct_output_labels_accepted() {
    let mut s = spec("w");
    s.streams.redirect_output = vec!["stdout".into(), "stderr".into()];
    assert!(validate_spec(&s).is_ok());
    assert!(!s.streams.merges_stderr());
    assert_eq!(s.streams.effective_labels(), vec!["stdout", "stderr"]);
}

#[test]
fn repeated_output_label_merges_stderr() {
    let mut s = spec("w");
    s.streams.redirect_output = vec!["out".into(), "out".into()];
    assert!(validate_spec(&s).is_ok());
    assert!(s.streams.merges_stderr());
    assert_eq!(s.streams.effective_labels(), vec!["out"]);
}

#[test]
fn resolve_environment_overlays_explicit_over_os() {
    let mut os_env = HashMap::new();
    os_env.insert("PATH".to_string(), "/usr/bin".to_string());
    os_env.insert("FOO".to_string(), "os-value".to_string());
    let mut explicit = HashMap::new();
    explicit.insert("FOO".to_string(), "explicit-value".to_string());

    let resolved = resolve_environment(true, &os_env, &explicit);
    assert_eq!(resolved.get("PATH").map(String::as_str), Some("/usr/bin"));
    assert_eq!(resolved.get("FOO").map(String::as_str), Some("explicit-value"));
}

#[test]
fn resolve_environment_ignores_os_when_disabled() {
    let mut os_env = HashMap::new();
    os_env.insert("PATH".to_string(), "/usr/bin".to_string());
    let resolved = resolve_environment(false, &os_env, &HashMap::new());
    assert!(resolved.is_empty());
}

#[test]
fn substitute_vars_dollar_and_braced_forms() {
    let mut env = HashMap::new();
    env.insert("NAME".to_string(), "world".to_string());
    assert_eq!(substitute_vars("hello $NAME", &env), "hello world");
    assert_eq!(substitute_vars("hello ${NAME}!", &env), "hello world!");
}

#[test]
fn substitute_vars_missing_variable_drops_to_empty() {
    let env = HashMap::new();
    assert_eq!(substitute_vars("$MISSING end", &env), " end");
}

#[test]
fn substitute_vars_leaves_non_variable_dollar_alone() {
    let env = HashMap::new();
    assert_eq!(substitute_vars("price: $5", &env), "price: $5");
}
