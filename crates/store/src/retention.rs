// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention sweeps: soft-delete, hard-delete, workflow and event pruning.

use crate::error::StoreError;
use crate::Store;
use coven_core::TaskStatus;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const HOUR_MS: u64 = 60 * 60 * 1000;

/// Retention windows, mirroring the `task_store.*` config keys.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Closed tasks older than this are soft-deleted.
    pub retention_days: u32,
    /// Soft-deleted tasks older than this are hard-deleted.
    pub soft_delete_days: u32,
    /// Completed workflows older than this are deleted.
    pub workflow_retention_days: u32,
    /// Events older than this are pruned.
    pub event_retention_hours: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: 30,
            soft_delete_days: 7,
            workflow_retention_days: 7,
            event_retention_hours: 24,
        }
    }
}

/// What one sweep did, for the scheduler's log line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub tasks_soft_deleted: usize,
    pub tasks_hard_deleted: usize,
    pub workflows_deleted: usize,
    pub events_pruned: usize,
}

impl Store {
    /// Run the full retention sweep.
    ///
    /// History, questions, and the tag/children index rows go with their
    /// task in `hard_delete_task`.
    pub fn retention_sweep(
        &self,
        policy: &RetentionPolicy,
        now_ms: u64,
    ) -> Result<SweepStats, StoreError> {
        let mut stats = SweepStats::default();

        let soft_cutoff = now_ms.saturating_sub(u64::from(policy.retention_days) * DAY_MS);
        let hard_cutoff = now_ms.saturating_sub(u64::from(policy.soft_delete_days) * DAY_MS);

        for task in self.list_tasks()? {
            match task.deleted_at_ms {
                Some(deleted_at) if deleted_at < hard_cutoff => {
                    self.hard_delete_task(&task.id)?;
                    stats.tasks_hard_deleted += 1;
                }
                None if task.status == TaskStatus::Closed && task.updated_at_ms < soft_cutoff => {
                    self.soft_delete_task(&task.id, now_ms)?;
                    stats.tasks_soft_deleted += 1;
                }
                _ => {}
            }
        }

        let workflow_cutoff =
            now_ms.saturating_sub(u64::from(policy.workflow_retention_days) * DAY_MS);
        for workflow in self.list_workflows()? {
            if workflow.status.is_terminal()
                && workflow.completed_at_ms.unwrap_or(workflow.updated_at_ms) < workflow_cutoff
            {
                self.delete_workflow(&workflow.task_id)?;
                stats.workflows_deleted += 1;
            }
        }

        let event_cutoff = now_ms.saturating_sub(u64::from(policy.event_retention_hours) * HOUR_MS);
        stats.events_pruned = self.prune_events(event_cutoff)?;

        Ok(stats)
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
