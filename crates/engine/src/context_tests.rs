// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::{StepAction, StepKind};
use std::path::PathBuf;

fn ctx() -> StepContext {
    StepContext::from_workflow(
        coven_core::Task::builder().title("add dark mode").build(),
        coven_core::Workflow::builder().build(),
        PathBuf::from("/tmp/wt"),
        "coven/task-1".to_string(),
    )
}

fn result(name: &str, success: bool) -> StepResult {
    StepResult {
        name: name.to_string(),
        kind: StepKind::Script,
        success,
        skipped: false,
        output: serde_json::json!("text output"),
        exit_code: Some(i32::from(!success)),
        error: None,
        duration_ms: 5,
        action: StepAction::Continue,
    }
}

#[test]
fn reserved_keys_are_present() {
    let value = ctx().to_value();
    assert_eq!(value["task"]["title"], "add dark mode");
    assert_eq!(value["worktree"], "/tmp/wt");
    assert_eq!(value["branch"], "coven/task-1");
    assert!(value["previous"].is_null());
    assert!(value.get("loop").is_none());
}

#[test]
fn absorb_exposes_previous_and_named_step() {
    let mut ctx = ctx();
    ctx.absorb(&result("build", false), None);

    let value = ctx.to_value();
    assert_eq!(value["previous"]["failed"], true);
    assert_eq!(value["previous"]["success"], false);
    assert_eq!(value["build"]["failed"], true);
    assert_eq!(value["build"]["output"], "text output");
}

#[test]
fn output_bindings_are_top_level() {
    let mut ctx = ctx();
    ctx.absorb(&result("build", true), Some(("build_log", serde_json::json!("captured"))));

    let value = ctx.to_value();
    assert_eq!(value["build_log"], "captured");
}

#[test]
fn agent_outputs_map_is_lifted() {
    let mut ctx = ctx();
    let mut agent_result = result("implement", true);
    agent_result.kind = StepKind::Agent;
    agent_result.output =
        serde_json::json!({"success": true, "outputs": {"pr_url": "http://x/42"}});
    ctx.absorb(&agent_result, None);

    let value = ctx.to_value();
    assert_eq!(value["implement"]["outputs"]["pr_url"], "http://x/42");
}

#[test]
fn reserved_names_shadow_bindings() {
    let mut ctx = ctx();
    ctx.absorb(&result("task", true), Some(("worktree", serde_json::json!("bogus"))));

    let value = ctx.to_value();
    // Bindings and step names never clobber the reserved view.
    assert_eq!(value["worktree"], "/tmp/wt");
    assert_eq!(value["task"]["title"], "add dark mode");
}

#[test]
fn loop_scope_is_visible_under_loop_and_its_own_name() {
    let mut ctx = ctx();
    ctx.loop_scope = Some(LoopScope {
        name: "fix_loop".to_string(),
        iteration: 2,
        entry: serde_json::json!({"snapshot": true}),
    });

    let value = ctx.to_value();
    assert_eq!(value["loop"]["iteration"], 2);
    assert_eq!(value["loop"]["entry"]["snapshot"], true);
    // The documented notation addresses the scope by the loop's name.
    assert_eq!(value["fix_loop"]["iteration"], 2);
    assert_eq!(value["fix_loop"]["entry"]["snapshot"], true);
    assert_eq!(value["loop_entry"]["snapshot"], true);
}

#[test]
fn loop_named_after_reserved_key_does_not_clobber_it() {
    let mut ctx = ctx();
    ctx.loop_scope = Some(LoopScope {
        name: "task".to_string(),
        iteration: 1,
        entry: serde_json::json!({}),
    });

    let value = ctx.to_value();
    assert_eq!(value["task"]["title"], "add dark mode");
    assert_eq!(value["loop"]["iteration"], 1);
}

#[test]
fn skipped_steps_count_as_previous() {
    let mut ctx = ctx();
    ctx.absorb(&StepResult::skipped("lint", StepKind::Script), None);
    let value = ctx.to_value();
    assert_eq!(value["previous"]["skipped"], true);
    assert_eq!(value["previous"]["failed"], false);
}
