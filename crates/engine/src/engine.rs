// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow engine: step dispatch, persistence, pause/resume.

use crate::context::StepContext;
use crate::error::EngineError;
use crate::executor::{Block, StepRunner};
use crate::wf_log::{WorkflowLogEntry, WorkflowLogger};
use coven_agent::{AgentAdapter, AgentHandle, MergeOutcome, WorktreeAdapter};
use coven_core::{Clock, Event, EventKind, StepAction, StepResult, TaskId, TaskStatus, WorkflowStatus};
use coven_grimoire::{ConditionEvaluator, Grimoire, SpellRenderer, StepTimeouts, BUILTIN_GRIMOIRE};
use coven_store::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Engine construction parameters that are plain data.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Agent binary name (config `agent_command`)
    pub agent_command: String,
    /// Tool allow-list passed to every agent
    pub allowed_tools: Vec<String>,
    pub timeouts: StepTimeouts,
    /// Directory for per-workflow execution logs
    pub workflow_logs_dir: PathBuf,
    pub spells_dir: PathBuf,
    pub max_payload_bytes: usize,
}

/// Result of an approve-merge call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    Merged,
    Conflicts { files: Vec<String> },
}

/// The workflow engine. One instance drives every workflow in the
/// daemon; each running workflow is its own tokio task.
pub struct Engine<A, W, C: Clock> {
    runner: StepRunner<A, W, C>,
    grimoires: Arc<HashMap<String, Grimoire>>,
    config: EngineConfig,
    /// Cancel tokens for actively running workflows
    running: Mutex<HashMap<TaskId, CancellationToken>>,
    /// Back-reference for spawning runs from `&self` methods
    me: std::sync::Weak<Self>,
}

impl<A, W, C> Engine<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    pub fn new(
        store: Arc<Store>,
        agents: Arc<A>,
        worktrees: Arc<W>,
        grimoires: HashMap<String, Grimoire>,
        events: mpsc::Sender<Event>,
        clock: C,
        config: EngineConfig,
    ) -> Arc<Self> {
        let runner = StepRunner {
            store,
            agents,
            worktrees,
            spells: SpellRenderer::new(&config.spells_dir),
            conditions: ConditionEvaluator::new(),
            timeouts: config.timeouts,
            clock,
            events,
            agent_command: config.agent_command.clone(),
            allowed_tools: config.allowed_tools.clone(),
            max_payload_bytes: config.max_payload_bytes,
            handles: Arc::new(Mutex::new(HashMap::new())),
        };
        Arc::new_cyclic(|me| Self {
            runner,
            grimoires: Arc::new(grimoires),
            config,
            running: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.runner.store
    }

    pub fn grimoires(&self) -> &Arc<HashMap<String, Grimoire>> {
        &self.grimoires
    }

    /// Emit an event onto the broker channel.
    pub async fn emit(&self, kind: EventKind, entity: &str, payload: serde_json::Value) {
        self.runner.emit(kind, entity, payload).await;
    }

    /// Number of workflows currently executing (the scheduler's cap).
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    /// Control handle for a live agent, if one is running for the task.
    pub fn agent_handle(&self, task_id: &TaskId) -> Option<AgentHandle> {
        self.runner.handles.lock().get(task_id).cloned()
    }

    /// Launch a workflow run as a background task.
    pub fn spawn_run(&self, task_id: TaskId) {
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = engine.run_workflow(&task_id).await {
                tracing::error!(task = %task_id, error = %e, "workflow run failed");
            }
        });
    }

    /// On startup: resume every workflow the store says was running.
    /// `pending_merge` and `blocked` workflows stay parked until an
    /// external action moves them; `skip` carries tasks whose orphaned
    /// agent is still alive and being watched (resuming would spawn a
    /// second agent into the same worktree).
    pub fn resume_all(&self, skip: &[TaskId]) -> Result<usize, EngineError> {
        let resumable = self.runner.store.resumable_workflows()?;
        let mut resumed = 0;
        for workflow in resumable {
            if workflow.status == WorkflowStatus::Running && !skip.contains(&workflow.task_id) {
                self.spawn_run(workflow.task_id.clone());
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Drive a workflow from its current step to a pause or terminal
    /// state. Completed step results are never re-executed.
    pub async fn run_workflow(&self, task_id: &TaskId) -> Result<WorkflowStatus, EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        if workflow.status != WorkflowStatus::Running {
            return Ok(workflow.status);
        }

        // One driver per workflow at a time.
        let cancel = CancellationToken::new();
        {
            let mut running = self.running.lock();
            if running.contains_key(task_id) {
                return Ok(WorkflowStatus::Running);
            }
            running.insert(task_id.clone(), cancel.clone());
        }
        let result = self.run_inner(task_id, workflow, &cancel).await;
        self.running.lock().remove(task_id);
        result
    }

    async fn run_inner(
        &self,
        task_id: &TaskId,
        workflow: coven_core::Workflow,
        cancel: &CancellationToken,
    ) -> Result<WorkflowStatus, EngineError> {
        let grimoire = match self.grimoire_for(&workflow.grimoire) {
            Ok(grimoire) => grimoire,
            // A grimoire deleted between scheduling and execution: the
            // workflow cannot make progress, ever.
            Err(e) => return self.finish(task_id, WorkflowStatus::Failed, Some(&e.to_string())).await,
        };
        let task = self.runner.store.get_task(task_id)?;
        let agent = self.runner.store.get_agent(task_id)?;

        let mut logger = WorkflowLogger::open(&self.config.workflow_logs_dir, workflow.id.as_str())?;
        let fresh_start = workflow.current_step == 0 && workflow.step_results.is_empty();
        if fresh_start {
            logger.log(&WorkflowLogEntry::WorkflowStart {
                ts: self.runner.clock.epoch_ms(),
                workflow: workflow.id.as_str(),
                grimoire: &workflow.grimoire,
            });
        }
        let logger = Mutex::new(logger);

        // Workflow-scope deadline, measured from the original start so a
        // daemon restart does not reset the clock.
        let timeout = grimoire.timeout.unwrap_or(self.config.timeouts.workflow);
        let elapsed =
            Duration::from_millis(self.runner.clock.epoch_ms().saturating_sub(workflow.started_at_ms));
        let remaining = timeout.saturating_sub(elapsed);

        let mut ctx = StepContext::from_workflow(
            task,
            workflow.clone(),
            agent.worktree.clone(),
            agent.branch.clone(),
        );
        // Resume: the previous step is the one before the cursor.
        if workflow.current_step > 0 {
            if let Some(prev) = grimoire.steps.get(workflow.current_step - 1) {
                ctx.previous = workflow.step_result(&prev.name).cloned();
            }
        }

        let body = self.step_loop(task_id, &grimoire, workflow.current_step, &mut ctx, cancel, &logger);
        tokio::pin!(body);
        let status = tokio::select! {
            status = &mut body => status?,
            _ = tokio::time::sleep(remaining) => {
                self.abort_for_timeout(task_id).await?
            }
        };

        let status_name = status.to_string();
        let end_entry = match status {
            WorkflowStatus::Blocked | WorkflowStatus::PendingMerge => WorkflowLogEntry::WorkflowBlocked {
                ts: self.runner.clock.epoch_ms(),
                reason: if status == WorkflowStatus::PendingMerge { "pending_merge" } else { "blocked" },
            },
            _ => WorkflowLogEntry::WorkflowEnd {
                ts: self.runner.clock.epoch_ms(),
                status: &status_name,
            },
        };
        logger.lock().log(&end_entry);
        Ok(status)
    }

    /// The sequential dispatch loop.
    async fn step_loop(
        &self,
        task_id: &TaskId,
        grimoire: &Grimoire,
        start_at: usize,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
        logger: &Mutex<WorkflowLogger>,
    ) -> Result<WorkflowStatus, EngineError> {
        let now = || self.runner.clock.epoch_ms();
        let mut index = start_at;

        while let Some(step) = grimoire.steps.get(index) {
            logger.lock().log(&WorkflowLogEntry::StepStart {
                ts: now(),
                step: &step.name,
                index,
            });
            self.runner
                .emit(
                    EventKind::WorkflowStepStarted,
                    task_id.as_str(),
                    serde_json::json!({"step": step.name, "index": index}),
                )
                .await;

            let outcome = self.runner.execute_step(step, ctx, cancel, logger).await;
            let result = &outcome.result;

            let advance_to = match result.action {
                StepAction::Continue | StepAction::ExitLoop => Some(index + 1),
                StepAction::Block | StepAction::Fail => None,
            };
            let binding = step.output.as_deref().map(|name| (name, result.output.clone()));
            self.runner.store.record_step_result(
                task_id,
                result,
                advance_to,
                binding.clone(),
                now(),
            )?;
            ctx.absorb(result, binding);

            logger.lock().log(&WorkflowLogEntry::StepEnd {
                ts: now(),
                step: &step.name,
                success: result.success,
                action: &result.action.to_string(),
            });
            self.runner
                .emit(
                    EventKind::WorkflowStepCompleted,
                    task_id.as_str(),
                    serde_json::json!({
                        "step": result.name,
                        "success": result.success,
                        "skipped": result.skipped,
                        "action": result.action,
                    }),
                )
                .await;

            match result.action {
                // exit_loop outside a loop is a continue.
                StepAction::Continue | StepAction::ExitLoop => {
                    index += 1;
                }
                StepAction::Block => {
                    return self.pause(task_id, outcome.block, result.error.as_deref()).await;
                }
                StepAction::Fail => {
                    if cancel.is_cancelled() {
                        return self.finish(task_id, WorkflowStatus::Cancelled, None).await;
                    }
                    return self
                        .finish(task_id, WorkflowStatus::Failed, result.error.as_deref())
                        .await;
                }
            }
        }

        self.finish(task_id, WorkflowStatus::Completed, None).await
    }

    /// Persist a block state and surface it.
    async fn pause(
        &self,
        task_id: &TaskId,
        block: Option<Block>,
        error: Option<&str>,
    ) -> Result<WorkflowStatus, EngineError> {
        let now = self.runner.clock.epoch_ms();
        let (wf_status, task_status, kind, reason) = match &block {
            Some(Block::PendingMerge) => (
                WorkflowStatus::PendingMerge,
                TaskStatus::PendingMerge,
                EventKind::WorkflowPendingMerge,
                "pending_merge".to_string(),
            ),
            Some(Block::Blocked(reason)) => (
                WorkflowStatus::Blocked,
                TaskStatus::Blocked,
                EventKind::WorkflowBlocked,
                reason.clone(),
            ),
            None => (
                WorkflowStatus::Blocked,
                TaskStatus::Blocked,
                EventKind::WorkflowBlocked,
                error.unwrap_or("blocked").to_string(),
            ),
        };

        self.runner.store.block_workflow(task_id, wf_status, &reason, now)?;
        self.runner.store.set_task_status(task_id, task_status, "engine", now)?;
        self.runner
            .emit(kind, task_id.as_str(), serde_json::json!({"reason": reason}))
            .await;
        self.emit_task_updated(task_id, task_status).await;
        Ok(wf_status)
    }

    /// Persist a terminal state and surface it.
    async fn finish(
        &self,
        task_id: &TaskId,
        status: WorkflowStatus,
        error: Option<&str>,
    ) -> Result<WorkflowStatus, EngineError> {
        let now = self.runner.clock.epoch_ms();
        match error {
            Some(error) => {
                self.runner.store.set_workflow_error(task_id, status, error, now)?;
            }
            None => {
                self.runner.store.set_workflow_status(task_id, status, now)?;
            }
        }

        let (task_status, kind) = match status {
            WorkflowStatus::Completed => (TaskStatus::Closed, EventKind::WorkflowCompleted),
            WorkflowStatus::Cancelled => (TaskStatus::Blocked, EventKind::WorkflowCancelled),
            _ => (TaskStatus::Blocked, EventKind::WorkflowFailed),
        };
        self.runner.store.set_task_status(task_id, task_status, "engine", now)?;
        self.runner
            .emit(kind, task_id.as_str(), serde_json::json!({"error": error}))
            .await;
        self.emit_task_updated(task_id, task_status).await;
        Ok(status)
    }

    /// Workflow deadline exceeded: stop any live agent and fail.
    async fn abort_for_timeout(&self, task_id: &TaskId) -> Result<WorkflowStatus, EngineError> {
        if let Some(handle) = self.agent_handle(task_id) {
            handle.stop();
            self.runner.handles.lock().remove(task_id);
            // The aborted step's executor is gone; observe the terminal
            // state here so the record does not stay `running`.
            let _ = self.runner.store.finish_agent(
                task_id,
                coven_core::AgentStatus::Killed,
                None,
                Some("workflow_timeout".to_string()),
                self.runner.clock.epoch_ms(),
            );
        }
        self.finish(task_id, WorkflowStatus::Failed, Some("workflow_timeout")).await
    }

    /// Rejoin the step loop after a reattached orphan agent exited with
    /// committed work.
    ///
    /// The old daemon's pipes died with it, so the agent's completion
    /// block is unrecoverable; the commits are the evidence the
    /// in-flight step records. The remaining grimoire steps (the merge
    /// gate included) then run with their normal semantics.
    pub async fn resume_after_reattach(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        if workflow.status != WorkflowStatus::Running {
            return Ok(());
        }
        let grimoire = match self.grimoire_for(&workflow.grimoire) {
            Ok(grimoire) => grimoire,
            Err(e) => {
                self.finish(task_id, WorkflowStatus::Failed, Some(&e.to_string())).await?;
                return Ok(());
            }
        };

        if let Some(step) = grimoire.steps.get(workflow.current_step) {
            let result = StepResult {
                name: step.name.clone(),
                kind: step.kind(),
                success: true,
                skipped: false,
                output: serde_json::json!({
                    "reattached": true,
                    "summary": "agent finished across a daemon restart",
                }),
                exit_code: None,
                error: None,
                duration_ms: 0,
                action: StepAction::Continue,
            };
            let binding = step.output.as_deref().map(|name| (name, result.output.clone()));
            self.runner.store.record_step_result(
                task_id,
                &result,
                Some(workflow.current_step + 1),
                binding,
                self.runner.clock.epoch_ms(),
            )?;
            self.runner
                .emit(
                    EventKind::WorkflowStepCompleted,
                    task_id.as_str(),
                    serde_json::json!({
                        "step": result.name,
                        "success": true,
                        "skipped": false,
                        "action": result.action,
                    }),
                )
                .await;
        }

        self.spawn_run(task_id.clone());
        Ok(())
    }

    /// Cooperatively cancel a workflow. Idempotent: terminal workflows
    /// report their current state untouched.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<WorkflowStatus, EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        if workflow.status.is_terminal() {
            return Ok(workflow.status);
        }

        if let Some(token) = self.running.lock().get(task_id) {
            // The running driver observes the token and finishes as
            // cancelled.
            token.cancel();
            return Ok(WorkflowStatus::Running);
        }

        // Parked (pending_merge / blocked): cancel directly.
        self.finish(task_id, WorkflowStatus::Cancelled, Some("cancelled")).await
    }

    /// Approve a pending merge: merge the worktree branch to the target
    /// and resume the workflow after the merge step.
    pub async fn approve_merge(&self, task_id: &TaskId) -> Result<MergeDecision, EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        match workflow.status {
            WorkflowStatus::PendingMerge => {}
            // Idempotent on an already-merged workflow.
            WorkflowStatus::Completed => return Ok(MergeDecision::Merged),
            WorkflowStatus::Running => return Ok(MergeDecision::Merged),
            _ => return Err(EngineError::NotPendingMerge),
        }

        let agent = self.runner.store.get_agent(task_id)?;
        // Capture any work the agent left uncommitted, then merge.
        let task = self.runner.store.get_task(task_id)?;
        self.runner
            .worktrees
            .commit_all(&agent.worktree, &format!("coven: {}", task.title))
            .await?;
        match self.runner.worktrees.merge_to_target(&agent.worktree).await? {
            MergeOutcome::Merged => {
                let now = self.runner.clock.epoch_ms();
                self.runner.store.resume_workflow_at(task_id, workflow.current_step + 1, now)?;
                self.runner.store.set_task_status(task_id, TaskStatus::InProgress, "api", now)?;
                self.spawn_run(task_id.clone());
                Ok(MergeDecision::Merged)
            }
            MergeOutcome::Conflicts { files } => {
                let now = self.runner.clock.epoch_ms();
                self.runner.store.block_workflow(
                    task_id,
                    WorkflowStatus::Blocked,
                    "merge_conflict",
                    now,
                )?;
                self.runner.store.set_task_status(task_id, TaskStatus::Blocked, "api", now)?;
                self.runner
                    .emit(
                        EventKind::WorkflowBlocked,
                        task_id.as_str(),
                        serde_json::json!({"reason": "merge_conflict", "conflict_files": files}),
                    )
                    .await;
                Ok(MergeDecision::Conflicts { files })
            }
        }
    }

    /// Reject a pending merge: the workflow blocks and the worktree is
    /// left intact for inspection.
    pub async fn reject_merge(&self, task_id: &TaskId) -> Result<WorkflowStatus, EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        if workflow.status != WorkflowStatus::PendingMerge {
            return Err(EngineError::NotPendingMerge);
        }
        let now = self.runner.clock.epoch_ms();
        self.runner.store.block_workflow(task_id, WorkflowStatus::Blocked, "merge_rejected", now)?;
        self.runner.store.set_task_status(task_id, TaskStatus::Blocked, "api", now)?;
        self.runner
            .emit(
                EventKind::WorkflowBlocked,
                task_id.as_str(),
                serde_json::json!({"reason": "merge_rejected"}),
            )
            .await;
        Ok(WorkflowStatus::Blocked)
    }

    /// Retry a failed or blocked workflow from the failed step (the
    /// cursor was not advanced when it failed).
    pub async fn retry(&self, task_id: &TaskId) -> Result<WorkflowStatus, EngineError> {
        let workflow = self.runner.store.get_workflow(task_id)?;
        if !matches!(workflow.status, WorkflowStatus::Failed | WorkflowStatus::Blocked) {
            return Ok(workflow.status);
        }
        let now = self.runner.clock.epoch_ms();
        self.runner.store.resume_workflow_at(task_id, workflow.current_step, now)?;
        self.runner.store.set_task_status(task_id, TaskStatus::InProgress, "api", now)?;
        self.spawn_run(task_id.clone());
        Ok(WorkflowStatus::Running)
    }

    async fn emit_task_updated(&self, task_id: &TaskId, status: TaskStatus) {
        self.runner
            .emit(
                EventKind::TasksUpdated,
                task_id.as_str(),
                serde_json::json!({"status": status}),
            )
            .await;
    }

    fn grimoire_for(&self, name: &str) -> Result<Grimoire, EngineError> {
        if let Some(grimoire) = self.grimoires.get(name) {
            return Ok(grimoire.clone());
        }
        if name == BUILTIN_GRIMOIRE {
            return Ok(Grimoire::builtin_default());
        }
        Err(EngineError::MissingGrimoire(name.to_string()))
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
