// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::{AgentId, EventKind, TaskId, WorkflowStatus};
use std::path::PathBuf;
use tempfile::TempDir;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path().join("coven.db")).unwrap()
}

fn closed_task(store: &Store, id: &str, updated_at_ms: u64) -> TaskId {
    let task = coven_core::Task::builder()
        .id(id)
        .status(coven_core::TaskStatus::Closed)
        .updated_at_ms(updated_at_ms)
        .build();
    store.create_task(&task).unwrap();
    task.id
}

#[test]
fn sweep_soft_deletes_old_closed_tasks() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = 100 * DAY_MS;
    let old = closed_task(&store, "task-old", now - 40 * DAY_MS);
    let recent = closed_task(&store, "task-recent", now - 2 * DAY_MS);

    let stats = store.retention_sweep(&RetentionPolicy::default(), now).unwrap();
    assert_eq!(stats.tasks_soft_deleted, 1);
    assert!(store.get_task(&old).unwrap().is_deleted());
    assert!(!store.get_task(&recent).unwrap().is_deleted());
}

#[test]
fn sweep_hard_deletes_after_grace_period() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = 100 * DAY_MS;
    let id = closed_task(&store, "task-old", now - 40 * DAY_MS);
    store.soft_delete_task(&id, now - 10 * DAY_MS).unwrap();

    let stats = store.retention_sweep(&RetentionPolicy::default(), now).unwrap();
    assert_eq!(stats.tasks_hard_deleted, 1);
    assert!(matches!(store.get_task(&id), Err(StoreError::TaskNotFound(_))));
}

#[test]
fn sweep_deletes_old_completed_workflows_keeps_running() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = 100 * DAY_MS;

    for (task_id, status) in
        [("task-done", WorkflowStatus::Completed), ("task-live", WorkflowStatus::Running)]
    {
        let task = coven_core::Task::builder().id(task_id).build();
        store.create_task(&task).unwrap();
        store
            .claim_and_start_workflow(
                &task.id,
                &AgentId::new(),
                "simple",
                &PathBuf::from("/tmp/wt"),
                "b",
                &PathBuf::from("/tmp/o.jsonl"),
                now - 20 * DAY_MS,
            )
            .unwrap();
        if status.is_terminal() {
            store.set_workflow_status(&task.id, status, now - 20 * DAY_MS).unwrap();
        }
    }

    let stats = store.retention_sweep(&RetentionPolicy::default(), now).unwrap();
    assert_eq!(stats.workflows_deleted, 1);
    assert!(store.get_workflow(&TaskId::from_string("task-live")).is_ok());
    assert!(store.get_workflow(&TaskId::from_string("task-done")).is_err());
}

#[test]
fn sweep_prunes_events_past_retention() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = 100 * DAY_MS;
    store
        .append_event(&coven_core::Event::new(EventKind::Heartbeat, "daemon", now - 2 * DAY_MS))
        .unwrap();
    store
        .append_event(&coven_core::Event::new(EventKind::Heartbeat, "daemon", now - 1000))
        .unwrap();

    let stats = store.retention_sweep(&RetentionPolicy::default(), now).unwrap();
    assert_eq!(stats.events_pruned, 1);
}
