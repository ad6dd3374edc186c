// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow records and the atomic cross-entity start transaction.

use crate::db::{get_json, put_json, scan_json, Store, AGENTS, META, TASKS, TASK_HISTORY, WORKFLOWS};
use crate::error::{ClaimError, StoreError};
use crate::tasks::claim_in_txn;
use coven_core::{
    AgentId, AgentRecord, AgentStatus, MergeReview, StepResult, Task, TaskId, Workflow, WorkflowId,
    WorkflowStatus,
};
use std::path::Path;

/// Everything created by [`Store::claim_and_start_workflow`].
#[derive(Debug)]
pub struct WorkflowStart {
    pub task: Task,
    pub agent: AgentRecord,
    pub workflow: Workflow,
}

impl Store {
    /// Claim a task and create its agent and workflow records in a
    /// single transaction. Any failure rolls back everything.
    ///
    /// The agent record starts in `starting`; the caller creates the
    /// output file before spawning the subprocess.
    #[allow(clippy::too_many_arguments)]
    pub fn claim_and_start_workflow(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        grimoire: &str,
        worktree: &Path,
        branch: &str,
        output_path: &Path,
        now_ms: u64,
    ) -> Result<WorkflowStart, ClaimError> {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let start = {
            let mut tasks = txn.open_table(TASKS).map_err(StoreError::from)?;
            let mut history = txn.open_table(TASK_HISTORY).map_err(StoreError::from)?;
            let mut meta = txn.open_table(META).map_err(StoreError::from)?;
            let mut agents = txn.open_table(AGENTS).map_err(StoreError::from)?;
            let mut workflows = txn.open_table(WORKFLOWS).map_err(StoreError::from)?;

            let task = claim_in_txn(&mut tasks, &mut history, &mut meta, task_id, agent_id, now_ms)?;

            let agent = AgentRecord {
                id: agent_id.clone(),
                task_id: task_id.clone(),
                pid: 0,
                status: AgentStatus::Starting,
                worktree: worktree.to_path_buf(),
                branch: branch.to_string(),
                output_path: output_path.to_path_buf(),
                line_count: 0,
                last_seq: 0,
                started_at_ms: now_ms,
                ended_at_ms: None,
                exit_code: None,
                error: None,
            };
            put_json(&mut agents, task_id.as_str(), &agent).map_err(ClaimError::Store)?;

            let workflow = Workflow {
                id: WorkflowId::new(),
                task_id: task_id.clone(),
                grimoire: grimoire.to_string(),
                current_step: 0,
                status: WorkflowStatus::Running,
                step_results: Default::default(),
                outputs: Default::default(),
                active_agent: Some(agent_id.clone()),
                started_at_ms: now_ms,
                updated_at_ms: now_ms,
                completed_at_ms: None,
                error: None,
                blocked_reason: None,
                merge_review: None,
            };
            put_json(&mut workflows, task_id.as_str(), &workflow).map_err(ClaimError::Store)?;

            WorkflowStart { task, agent, workflow }
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(start)
    }

    pub fn get_workflow(&self, task_id: &TaskId) -> Result<Workflow, StoreError> {
        let txn = self.db.begin_read()?;
        let workflows = txn.open_table(WORKFLOWS)?;
        get_json(&workflows, task_id.as_str())?
            .ok_or_else(|| StoreError::WorkflowNotFound(task_id.to_string()))
    }

    /// Look up a workflow by task id or by workflow execution id.
    pub fn find_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        let txn = self.db.begin_read()?;
        let workflows = txn.open_table(WORKFLOWS)?;
        if let Some(workflow) = get_json::<Workflow, _>(&workflows, id)? {
            return Ok(workflow);
        }
        // Workflow ids are not the bucket key; fall back to a scan.
        // Active workflows are bounded by max_concurrent_agents, so this
        // stays cheap.
        for workflow in scan_json::<Workflow, _>(&workflows)? {
            if workflow.id == id {
                return Ok(workflow);
            }
        }
        Err(StoreError::WorkflowNotFound(id.to_string()))
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let txn = self.db.begin_read()?;
        let workflows = txn.open_table(WORKFLOWS)?;
        scan_json(&workflows)
    }

    /// Workflows the engine should pick back up after a restart.
    pub fn resumable_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows = self.list_workflows()?;
        workflows.retain(|w| w.status.is_resumable());
        Ok(workflows)
    }

    /// Record a step result and advance the step cursor in one write.
    ///
    /// `advance_to` moves `current_step` (None leaves it, e.g. on a
    /// failed step that a retry should re-run). `output_binding` exposes
    /// the step's output under a name in the template-visible map.
    pub fn record_step_result(
        &self,
        task_id: &TaskId,
        result: &StepResult,
        advance_to: Option<usize>,
        output_binding: Option<(&str, serde_json::Value)>,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.step_results.insert(result.name.clone(), result.clone());
            if let Some(step) = advance_to {
                workflow.current_step = step;
            }
            if let Some((name, value)) = &output_binding {
                workflow.outputs.insert((*name).to_string(), value.clone());
            }
        })
    }

    /// Set workflow status, clearing or stamping completion as needed.
    pub fn set_workflow_status(
        &self,
        task_id: &TaskId,
        status: WorkflowStatus,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.status = status;
            if status.is_terminal() {
                workflow.completed_at_ms = Some(now_ms);
                workflow.active_agent = None;
            }
        })
    }

    pub fn set_workflow_error(
        &self,
        task_id: &TaskId,
        status: WorkflowStatus,
        error: &str,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.status = status;
            workflow.error = Some(error.to_string());
            if status.is_terminal() {
                workflow.completed_at_ms = Some(now_ms);
                workflow.active_agent = None;
            }
        })
    }

    /// Block the workflow with a reason (`merge_rejected`,
    /// `max_iterations_reached`, conflict details, ...).
    pub fn block_workflow(
        &self,
        task_id: &TaskId,
        status: WorkflowStatus,
        reason: &str,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.status = status;
            workflow.blocked_reason = Some(reason.to_string());
        })
    }

    /// Stage the merge-review artifact while a merge step awaits review.
    pub fn stage_merge_review(
        &self,
        task_id: &TaskId,
        review: &MergeReview,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.merge_review = Some(review.clone());
        })
    }

    pub fn set_active_agent(
        &self,
        task_id: &TaskId,
        agent: Option<AgentId>,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.active_agent = agent;
        })
    }

    /// Resume bookkeeping shared by approve-merge and retry: move the
    /// cursor and return to `running`.
    pub fn resume_workflow_at(
        &self,
        task_id: &TaskId,
        step: usize,
        now_ms: u64,
    ) -> Result<Workflow, StoreError> {
        self.update_workflow(task_id, now_ms, |workflow| {
            workflow.current_step = step;
            workflow.status = WorkflowStatus::Running;
            workflow.blocked_reason = None;
            workflow.error = None;
            workflow.merge_review = None;
        })
    }

    fn update_workflow(
        &self,
        task_id: &TaskId,
        now_ms: u64,
        apply: impl FnOnce(&mut Workflow),
    ) -> Result<Workflow, StoreError> {
        let txn = self.db.begin_write()?;
        let workflow = {
            let mut workflows = txn.open_table(WORKFLOWS)?;
            let mut workflow: Workflow = get_json(&workflows, task_id.as_str())?
                .ok_or_else(|| StoreError::WorkflowNotFound(task_id.to_string()))?;
            apply(&mut workflow);
            workflow.updated_at_ms = now_ms;
            put_json(&mut workflows, task_id.as_str(), &workflow)?;
            workflow
        };
        txn.commit()?;
        Ok(workflow)
    }

    /// Delete a workflow record (retention sweep).
    pub fn delete_workflow(&self, task_id: &TaskId) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut workflows = txn.open_table(WORKFLOWS)?;
            workflows.remove(task_id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflows_tests.rs"]
mod tests;
