// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn scoped_name_joins_with_a_dot() {
    assert_eq!(scoped_name("app", "web"), "app.web");
}

#[test]
fn split_scoped_name_recovers_both_parts() {
    assert_eq!(split_scoped_name("app.web"), Some(("app", "web")));
}

#[test]
fn split_scoped_name_uses_first_dot_only() {
    assert_eq!(split_scoped_name("app.web.extra"), Some(("app", "web.extra")));
}

#[test]
fn split_scoped_name_none_without_dot() {
    assert_eq!(split_scoped_name("nodot"), None);
}
