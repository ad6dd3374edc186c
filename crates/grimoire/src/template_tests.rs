// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn renders_variables_and_filters() {
    let env = environment(false);
    let ctx = serde_json::json!({ "name": "  Coven  ", "tags": ["a", "b"] });
    assert_eq!(render(&env, "{{ name | trim | upper }}", &ctx).unwrap(), "COVEN");
    assert_eq!(render(&env, "{{ tags | join(',') }}", &ctx).unwrap(), "a,b");
    assert_eq!(render(&env, "{{ missing | default('fallback') }}", &ctx).unwrap(), "fallback");
}

#[test]
fn comparison_and_boolean_operators() {
    let env = environment(false);
    let ctx = serde_json::json!({ "n": 3 });
    assert_eq!(render(&env, "{{ n > 2 and n < 5 }}", &ctx).unwrap(), "true");
    assert_eq!(render(&env, "{{ not (n == 3) }}", &ctx).unwrap(), "false");
}

#[test]
fn quote_filter_escapes_single_quotes() {
    let env = environment(false);
    let ctx = serde_json::json!({ "title": "don't break" });
    assert_eq!(render(&env, "{{ title | quote }}", &ctx).unwrap(), "'don'\\''t break'");
}

#[test]
fn lenient_mode_renders_undefined_as_empty() {
    let env = environment(false);
    assert_eq!(render(&env, "[{{ nope }}]", &serde_json::json!({})).unwrap(), "[]");
}

#[test]
fn strict_mode_errors_on_undefined() {
    let env = environment(true);
    assert!(render(&env, "{{ nope }}", &serde_json::json!({})).is_err());
}

#[test]
fn include_resolves_from_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("footer.md"), "-- {{ name }}").unwrap();

    let env = environment_with_includes(false, dir.path());
    let ctx = serde_json::json!({ "name": "coven" });
    assert_eq!(
        render(&env, "body\n{% include 'footer.md' %}", &ctx).unwrap(),
        "body\n-- coven"
    );
}
