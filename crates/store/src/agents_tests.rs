// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::AgentId;
use std::path::PathBuf;
use tempfile::TempDir;

fn store_with_agent(dir: &TempDir) -> (Store, TaskId) {
    let store = Store::open(dir.path().join("coven.db")).unwrap();
    let task = coven_core::Task::builder().id("task-1").build();
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
        .unwrap();
    (store, task.id)
}

#[test]
fn pid_and_status_updates() {
    let dir = TempDir::new().unwrap();
    let (store, task_id) = store_with_agent(&dir);

    store.set_agent_pid(&task_id, 4242).unwrap();
    store.set_agent_status(&task_id, AgentStatus::Running).unwrap();

    let agent = store.get_agent(&task_id).unwrap();
    assert_eq!(agent.pid, 4242);
    assert_eq!(agent.status, AgentStatus::Running);
}

#[test]
fn output_meta_is_batched_into_record() {
    let dir = TempDir::new().unwrap();
    let (store, task_id) = store_with_agent(&dir);

    store.update_agent_output_meta(&task_id, 120, 120).unwrap();
    let agent = store.get_agent(&task_id).unwrap();
    assert_eq!(agent.line_count, 120);
    assert_eq!(agent.last_seq, 120);
}

#[test]
fn terminal_state_is_written_once() {
    let dir = TempDir::new().unwrap();
    let (store, task_id) = store_with_agent(&dir);

    let agent = store
        .finish_agent(&task_id, AgentStatus::Completed, Some(0), None, 5_000)
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Completed);
    assert_eq!(agent.ended_at_ms, Some(5_000));

    // A racing failure observation must not overwrite the terminal state.
    let agent = store
        .finish_agent(&task_id, AgentStatus::Failed, Some(1), Some("late".into()), 6_000)
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Completed);
    assert_eq!(agent.exit_code, Some(0));
    assert_eq!(agent.ended_at_ms, Some(5_000));
}

#[test]
fn set_status_cannot_resurrect_terminal_agent() {
    let dir = TempDir::new().unwrap();
    let (store, task_id) = store_with_agent(&dir);
    store.finish_agent(&task_id, AgentStatus::Killed, None, None, 5_000).unwrap();

    store.set_agent_status(&task_id, AgentStatus::Running).unwrap();
    assert_eq!(store.get_agent(&task_id).unwrap().status, AgentStatus::Killed);
}

#[test]
fn running_agents_excludes_terminal() {
    let dir = TempDir::new().unwrap();
    let (store, task_id) = store_with_agent(&dir);
    assert_eq!(store.running_agents().unwrap().len(), 1);

    store.finish_agent(&task_id, AgentStatus::Failed, Some(1), None, 5_000).unwrap();
    assert!(store.running_agents().unwrap().is_empty());
}
