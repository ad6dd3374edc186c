// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ClaimError;
use coven_core::{StepAction, StepKind, TaskStatus};
use std::path::PathBuf;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path().join("coven.db")).unwrap()
}

fn start_workflow(store: &Store, task_id: &str) -> WorkflowStart {
    let task = coven_core::Task::builder().id(task_id).build();
    store.create_task(&task).unwrap();
    store
        .claim_and_start_workflow(
            &task.id,
            &AgentId::from_string("agt-1"),
            "simple",
            &PathBuf::from("/tmp/wt"),
            "coven/task-1",
            &PathBuf::from("/tmp/out.jsonl"),
            1_000,
        )
        .unwrap()
}

#[test]
fn start_creates_claim_agent_and_workflow_atomically() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    assert_eq!(start.task.status, TaskStatus::InProgress);
    assert_eq!(start.agent.status, AgentStatus::Starting);
    assert_eq!(start.workflow.status, WorkflowStatus::Running);
    assert_eq!(start.workflow.current_step, 0);

    // All three records exist.
    assert_eq!(store.get_task(&start.task.id).unwrap().claimed_by, start.agent.id);
    assert_eq!(store.get_agent(&start.task.id).unwrap(), start.agent);
    assert_eq!(store.get_workflow(&start.task.id).unwrap(), start.workflow);
    assert_eq!(store.history_for_task(&start.task.id).unwrap().len(), 2);
}

#[test]
fn start_on_claimed_task_rolls_back_everything() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    // Second start fails the claim and must leave no second records.
    let err = store
        .claim_and_start_workflow(
            &start.task.id,
            &AgentId::from_string("agt-2"),
            "other",
            &PathBuf::from("/tmp/wt2"),
            "coven/other",
            &PathBuf::from("/tmp/out2.jsonl"),
            2_000,
        )
        .unwrap_err();
    assert!(matches!(err, ClaimError::AlreadyClaimed(_)));

    let workflow = store.get_workflow(&start.task.id).unwrap();
    assert_eq!(workflow.grimoire, "simple");
    assert_eq!(store.get_agent(&start.task.id).unwrap().id, start.agent.id);
}

#[test]
fn record_step_result_advances_and_binds_output() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    let result = coven_core::StepResult {
        name: "build".to_string(),
        kind: StepKind::Script,
        success: true,
        skipped: false,
        output: serde_json::json!("ok\n"),
        exit_code: Some(0),
        error: None,
        duration_ms: 40,
        action: StepAction::Continue,
    };
    let workflow = store
        .record_step_result(
            &start.task.id,
            &result,
            Some(1),
            Some(("build_log", serde_json::json!("ok\n"))),
            2_000,
        )
        .unwrap();

    assert_eq!(workflow.current_step, 1);
    assert_eq!(workflow.step_results.get("build").unwrap(), &result);
    assert_eq!(workflow.outputs.get("build_log").unwrap(), &serde_json::json!("ok\n"));
    assert_eq!(workflow.updated_at_ms, 2_000);
}

#[test]
fn failed_step_can_leave_cursor_for_retry() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    let result = coven_core::StepResult {
        name: "build".to_string(),
        kind: StepKind::Script,
        success: false,
        skipped: false,
        output: serde_json::Value::Null,
        exit_code: Some(1),
        error: Some("exit 1".to_string()),
        duration_ms: 10,
        action: StepAction::Fail,
    };
    let workflow =
        store.record_step_result(&start.task.id, &result, None, None, 2_000).unwrap();
    assert_eq!(workflow.current_step, 0);
}

#[test]
fn terminal_status_stamps_completion_and_clears_agent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    let workflow =
        store.set_workflow_status(&start.task.id, WorkflowStatus::Completed, 9_000).unwrap();
    assert_eq!(workflow.completed_at_ms, Some(9_000));
    assert!(workflow.active_agent.is_none());
}

#[test]
fn find_workflow_accepts_either_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");

    assert_eq!(store.find_workflow("task-1").unwrap().id, start.workflow.id);
    assert_eq!(
        store.find_workflow(start.workflow.id.as_str()).unwrap().task_id,
        start.task.id
    );
    assert!(matches!(
        store.find_workflow("wf-missing"),
        Err(StoreError::WorkflowNotFound(_))
    ));
}

#[test]
fn resume_workflow_at_clears_block_state() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let start = start_workflow(&store, "task-1");
    store
        .block_workflow(&start.task.id, WorkflowStatus::Blocked, "merge_rejected", 2_000)
        .unwrap();

    let workflow = store.resume_workflow_at(&start.task.id, 2, 3_000).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Running);
    assert_eq!(workflow.current_step, 2);
    assert!(workflow.blocked_reason.is_none());
}

#[test]
fn resumable_workflows_excludes_terminal() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let a = start_workflow(&store, "task-1");
    let b = start_workflow(&store, "task-2");
    store.set_workflow_status(&b.task.id, WorkflowStatus::Failed, 2_000).unwrap();

    let resumable = store.resumable_workflows().unwrap();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].task_id, a.task.id);
}
