// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn ctx() -> serde_json::Value {
    serde_json::json!({
        "task": { "id": "task-1", "title": "add dark mode" },
        "worktree": "/tmp/wt",
    })
}

#[test]
fn inline_spell_renders_against_context() {
    let dir = TempDir::new().unwrap();
    let renderer = SpellRenderer::new(dir.path());
    let source = SpellSource::Inline("Work on: {{ task.title }}".to_string());
    let rendered = renderer.render(&source, &Default::default(), &ctx()).unwrap();
    assert_eq!(rendered, "Work on: add dark mode");
}

#[test]
fn named_spell_loads_with_md_extension() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("implement.md"), "Implement {{ task.title }}.").unwrap();

    let renderer = SpellRenderer::new(dir.path());
    let rendered = renderer
        .render(&SpellSource::Named("implement".to_string()), &Default::default(), &ctx())
        .unwrap();
    assert_eq!(rendered, "Implement add dark mode.");
}

#[test]
fn missing_spell_is_typed() {
    let dir = TempDir::new().unwrap();
    let renderer = SpellRenderer::new(dir.path());
    match renderer.render(&SpellSource::Named("ghost".to_string()), &Default::default(), &ctx()) {
        Err(SpellError::NotFound(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn input_values_are_templated_then_injected() {
    let dir = TempDir::new().unwrap();
    let renderer = SpellRenderer::new(dir.path());
    let mut input = std::collections::BTreeMap::new();
    input.insert("focus".to_string(), "{{ task.title | upper }}".to_string());

    let source = SpellSource::Inline("Focus: {{ focus }}".to_string());
    let rendered = renderer.render(&source, &input, &ctx()).unwrap();
    assert_eq!(rendered, "Focus: ADD DARK MODE");
}

#[test]
fn include_resolves_through_spell_dir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("guardrails.md"), "Never push to main.").unwrap();
    std::fs::write(
        dir.path().join("implement.md"),
        "Do it.\n{% include 'guardrails.md' %}",
    )
    .unwrap();

    let renderer = SpellRenderer::new(dir.path());
    let rendered = renderer
        .render(&SpellSource::Named("implement".to_string()), &Default::default(), &ctx())
        .unwrap();
    assert_eq!(rendered, "Do it.\nNever push to main.");
}

#[test]
fn render_error_carries_spell_name() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.md"), "{{ unclosed").unwrap();

    let renderer = SpellRenderer::new(dir.path());
    match renderer.render(&SpellSource::Named("broken".to_string()), &Default::default(), &ctx()) {
        Err(SpellError::Render { name, .. }) => assert_eq!(name, "broken"),
        other => panic!("expected Render error, got {other:?}"),
    }
}
