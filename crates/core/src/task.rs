// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and status state machine.
//!
//! Tasks are created by the external task CLI; the daemon claims them,
//! advances their status as workflows run, and closes or releases them.

use crate::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Task IDs are assigned by the task database, so the daemon treats
    /// them as opaque strings. `TaskId::new()` is only used by tests.
    pub struct TaskId("task-");
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ready to be claimed by the scheduler
    Open,
    /// Claimed; a workflow is running against it
    InProgress,
    /// Workflow finished its work and awaits merge review
    PendingMerge,
    /// Workflow hit a condition that needs human attention
    Blocked,
    /// Finished (merged, rejected, or manually closed)
    Closed,
}

crate::simple_display! {
    TaskStatus {
        Open => "open",
        InProgress => "in_progress",
        PendingMerge => "pending_merge",
        Blocked => "blocked",
        Closed => "closed",
    }
}

impl TaskStatus {
    /// Check if a task in this status can be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Open)
    }

    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Closed)
    }
}

/// A unit of work tracked by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Free-form task type from the task database (e.g. "feature", "bug")
    #[serde(default)]
    pub task_type: String,
    /// Priority 0 (highest) through 4 (lowest)
    pub priority: u8,
    pub status: TaskStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,
    /// Distance from the root of the task tree (0 for top-level tasks)
    #[serde(default)]
    pub depth: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// Soft-delete marker; hard deletion happens after the grace period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at_ms: Option<u64>,
    /// Claiming agent, empty when unclaimed
    #[serde(default)]
    pub claimed_by: AgentId,
    #[serde(default)]
    pub claimed_at_ms: u64,
}

impl Task {
    /// Check whether the claim invariant holds: `open` and unclaimed.
    pub fn is_claimable(&self) -> bool {
        self.status.is_claimable() && self.claimed_by.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at_ms.is_some()
    }

    /// Check if this task carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            id: TaskId = "task-1",
            title: String = "test task",
            body: String = "",
            task_type: String = "feature",
        }
        set {
            priority: u8 = 2,
            status: TaskStatus = TaskStatus::Open,
            tags: BTreeSet<String> = BTreeSet::new(),
            depth: u32 = 0,
            created_at_ms: u64 = 1_700_000_000_000,
            updated_at_ms: u64 = 1_700_000_000_000,
            claimed_by: AgentId = AgentId::default(),
            claimed_at_ms: u64 = 0,
        }
        option {
            parent: TaskId = None,
            deleted_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
