// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::TaskStatus;
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path().join("coven.db")).unwrap()
}

fn seed_task(store: &Store, id: &str) -> TaskId {
    let task = coven_core::Task::builder().id(id).build();
    store.create_task(&task).unwrap();
    task.id
}

#[test]
fn create_and_get_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let task = coven_core::Task::builder()
        .id("task-7")
        .tags(["backend".to_string()].into())
        .build();
    store.create_task(&task).unwrap();
    assert_eq!(store.get_task(&task.id).unwrap(), task);
    assert_eq!(store.tasks_with_tag("backend").unwrap(), vec![task.id]);
}

#[test]
fn get_missing_task_is_typed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    match store.get_task(&TaskId::from_string("task-nope")) {
        Err(StoreError::TaskNotFound(id)) => assert_eq!(id, "task-nope"),
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
}

#[test]
fn claim_requires_open_and_unclaimed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = seed_task(&store, "task-1");
    let agent = AgentId::from_string("agt-1");

    let claimed = store.claim_task(&id, &agent, 1_000).unwrap();
    assert_eq!(claimed.status, TaskStatus::InProgress);
    assert_eq!(claimed.claimed_by, agent);
    assert_eq!(claimed.claimed_at_ms, 1_000);

    // Second claim sees the already_claimed error, not invalid_status.
    match store.claim_task(&id, &AgentId::from_string("agt-2"), 2_000) {
        Err(ClaimError::AlreadyClaimed(t)) => assert_eq!(t, "task-1"),
        other => panic!("expected AlreadyClaimed, got {other:?}"),
    }
}

#[test]
fn claim_missing_task_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    match store.claim_task(&TaskId::from_string("task-x"), &AgentId::new(), 1) {
        Err(ClaimError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn claim_closed_task_is_invalid_status() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let task = coven_core::Task::builder().id("task-c").status(TaskStatus::Closed).build();
    store.create_task(&task).unwrap();
    match store.claim_task(&task.id, &AgentId::new(), 1) {
        Err(ClaimError::InvalidStatus { status, .. }) => assert_eq!(status, "closed"),
        other => panic!("expected InvalidStatus, got {other:?}"),
    }
}

#[test]
fn claim_writes_two_history_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = seed_task(&store, "task-1");
    store.claim_task(&id, &AgentId::from_string("agt-1"), 1_000).unwrap();

    let history = store.history_for_task(&id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].field, "status");
    assert_eq!(history[0].new_value, "in_progress");
    assert_eq!(history[1].field, "claimed_by");
    assert_eq!(history[1].new_value, "agt-1");
}

#[test]
fn concurrent_claims_admit_exactly_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir));
    let id = seed_task(&store, "task-race");

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        let id = id.clone();
        handles.push(std::thread::spawn(move || {
            store.claim_task(&id, &AgentId::from_string(format!("agt-{i}")), 1_000).is_ok()
        }));
    }

    let wins: usize = handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum();
    assert_eq!(wins, 1);
}

#[test]
fn release_returns_task_to_open() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = seed_task(&store, "task-1");
    store.claim_task(&id, &AgentId::from_string("agt-1"), 1_000).unwrap();
    store.release_task(&id, 2_000).unwrap();

    let task = store.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Open);
    assert!(task.claimed_by.is_empty());
    assert!(task.is_claimable());
}

#[test]
fn stale_claims_are_released_fresh_ones_kept() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let stale = seed_task(&store, "task-stale");
    let fresh = seed_task(&store, "task-fresh");
    store.claim_task(&stale, &AgentId::from_string("agt-1"), 1_000).unwrap();
    store.claim_task(&fresh, &AgentId::from_string("agt-2"), 50_000).unwrap();

    let released = store.release_stale_claims(10_000, 60_000).unwrap();
    assert_eq!(released, vec![stale.clone()]);
    assert_eq!(store.get_task(&stale).unwrap().status, TaskStatus::Open);
    assert_eq!(store.get_task(&fresh).unwrap().status, TaskStatus::InProgress);
}

#[test]
fn reparent_to_descendant_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let root = seed_task(&store, "task-root");
    let child = coven_core::Task::builder().id("task-child").parent(root.clone()).depth(1).build();
    store.create_task(&child).unwrap();

    match store.reparent_task(&root, Some(child.id.clone()), 1_000) {
        Err(StoreError::CyclicParent { task, parent }) => {
            assert_eq!(task, "task-root");
            assert_eq!(parent, "task-child");
        }
        other => panic!("expected CyclicParent, got {other:?}"),
    }
}

#[test]
fn reparent_recomputes_subtree_depth() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let a = seed_task(&store, "task-a");
    let b = coven_core::Task::builder().id("task-b").build();
    store.create_task(&b).unwrap();
    let c = coven_core::Task::builder().id("task-c").parent(b.id.clone()).depth(1).build();
    store.create_task(&c).unwrap();

    // Move b (with child c) under a.
    store.reparent_task(&b.id, Some(a.clone()), 1_000).unwrap();

    assert_eq!(store.get_task(&b.id).unwrap().depth, 1);
    assert_eq!(store.get_task(&c.id).unwrap().depth, 2);

    let history = store.history_for_task(&b.id).unwrap();
    assert_eq!(history.last().unwrap().field, "parent");
    assert_eq!(history.last().unwrap().new_value, "task-a");
}

#[test]
fn soft_delete_hides_task_from_claimable_set() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = seed_task(&store, "task-1");
    store.soft_delete_task(&id, 1_000).unwrap();

    assert!(store.get_task(&id).unwrap().is_deleted());
    assert!(store.claimable_tasks().unwrap().is_empty());
}

#[test]
fn hard_delete_prunes_indexes_and_history() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let task = coven_core::Task::builder()
        .id("task-1")
        .tags(["ui".to_string()].into())
        .build();
    store.create_task(&task).unwrap();
    store.claim_task(&task.id, &AgentId::from_string("agt-1"), 1_000).unwrap();

    store.hard_delete_task(&task.id).unwrap();

    assert!(matches!(store.get_task(&task.id), Err(StoreError::TaskNotFound(_))));
    assert!(store.tasks_with_tag("ui").unwrap().is_empty());
    assert!(store.history_for_task(&task.id).unwrap().is_empty());
}

#[test]
fn claimable_tasks_sort_by_priority_then_age() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    for (id, priority, created) in
        [("task-low", 3, 100), ("task-hot", 0, 300), ("task-old", 3, 50)]
    {
        let task = coven_core::Task::builder()
            .id(id)
            .priority(priority)
            .created_at_ms(created)
            .build();
        store.create_task(&task).unwrap();
    }

    let claimable = store.claimable_tasks().unwrap();
    let order: Vec<&str> = claimable.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(order, vec!["task-hot", "task-old", "task-low"]);
}
