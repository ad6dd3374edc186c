// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery: reconcile agent records that were live when the
//! previous daemon died.

use coven_agent::subprocess::{cmdline_contains, process_alive, wait_for_exit};
use coven_agent::{AgentAdapter, WorktreeAdapter};
use coven_core::{AgentRecord, AgentStatus, Clock, MergeReview, TaskStatus, WorkflowStatus};
use coven_engine::Engine;
use coven_store::Store;
use std::sync::Arc;
use std::time::Duration;

/// What recovery decided for one orphaned agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanDisposition {
    /// Process still alive and recognizably ours: watch it to completion
    Reattached,
    /// Process gone, uncommitted work left behind: needs a human
    FailedUncommitted,
    /// Process gone but commits exist: straight to merge review
    PendingMerge,
    /// Process gone, nothing to save: back to the queue
    NoWork,
}

/// Reconcile every non-terminal agent record. Returns the decisions for
/// logging.
pub async fn recover_orphans<A, W, C>(
    engine: &Arc<Engine<A, W, C>>,
    worktrees: &Arc<W>,
    agent_command: &str,
    clock: &C,
) -> Vec<(coven_core::TaskId, OrphanDisposition)>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    let agents = match engine.store().running_agents() {
        Ok(agents) => agents,
        Err(e) => {
            tracing::error!(error = %e, "failed to list agents for recovery");
            return Vec::new();
        }
    };

    let mut decisions = Vec::new();
    for agent in agents {
        let disposition = recover_one(engine, worktrees, agent_command, clock, &agent).await;
        tracing::info!(
            task = %agent.task_id,
            pid = agent.pid,
            disposition = ?disposition,
            "orphan recovery"
        );
        decisions.push((agent.task_id.clone(), disposition));
    }
    decisions
}

async fn recover_one<A, W, C>(
    engine: &Arc<Engine<A, W, C>>,
    worktrees: &Arc<W>,
    agent_command: &str,
    clock: &C,
    agent: &AgentRecord,
) -> OrphanDisposition
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    let store = Arc::clone(engine.store());
    let now = clock.epoch_ms();

    // Case 1: the process survived the restart and its command line
    // still names the agent binary. Let it finish; its pipes (stdin and
    // the output capture) died with the old daemon, so questions cannot
    // be routed and output past the restart is not logged. The watcher
    // reconciles on exit: committed work rejoins the engine's step loop
    // so the grimoire's remaining steps run normally.
    if agent.pid != 0
        && process_alive(agent.pid)
        && cmdline_contains(agent.pid, agent_command)
    {
        let engine = Arc::clone(engine);
        let worktrees = Arc::clone(worktrees);
        let record = agent.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            wait_for_exit(record.pid, Duration::from_secs(2)).await;
            let now = clock.epoch_ms();
            let store = Arc::clone(engine.store());
            match reconcile_worktree(&worktrees, &record).await {
                WorktreeState::CommitsAhead => {
                    let _ = store.finish_agent(
                        &record.task_id,
                        AgentStatus::Completed,
                        None,
                        None,
                        now,
                    );
                    if let Err(e) = engine.resume_after_reattach(&record.task_id).await {
                        tracing::warn!(task = %record.task_id, error = %e, "reattach resumption failed");
                    }
                }
                WorktreeState::Uncommitted => {
                    let _ = store.finish_agent(
                        &record.task_id,
                        AgentStatus::Failed,
                        None,
                        Some("daemon_restart_with_uncommitted_work".to_string()),
                        now,
                    );
                    settle(&store, &record, TaskStatus::Blocked, WorkflowStatus::Blocked, now);
                }
                WorktreeState::Clean => {
                    let _ = store.finish_agent(&record.task_id, AgentStatus::Failed, None, None, now);
                    reopen(&store, &record, now);
                }
            }
        });
        return OrphanDisposition::Reattached;
    }

    // The process is gone; classify by what it left in the worktree.
    match reconcile_worktree(worktrees, agent).await {
        WorktreeState::Uncommitted => {
            let _ = store.finish_agent(
                &agent.task_id,
                AgentStatus::Failed,
                None,
                Some("daemon_restart_with_uncommitted_work".to_string()),
                now,
            );
            settle(&store, agent, TaskStatus::Blocked, WorkflowStatus::Blocked, now);
            OrphanDisposition::FailedUncommitted
        }
        WorktreeState::CommitsAhead => {
            let _ = store.finish_agent(&agent.task_id, AgentStatus::Completed, None, None, now);
            // The review artifact clients expect with pending_merge.
            stage_review(&store, worktrees, agent, now).await;
            settle(&store, agent, TaskStatus::PendingMerge, WorkflowStatus::PendingMerge, now);
            OrphanDisposition::PendingMerge
        }
        WorktreeState::Clean => {
            let _ = store.finish_agent(&agent.task_id, AgentStatus::Failed, None, None, now);
            reopen(&store, agent, now);
            OrphanDisposition::NoWork
        }
    }
}

enum WorktreeState {
    Uncommitted,
    CommitsAhead,
    Clean,
}

async fn reconcile_worktree<W: WorktreeAdapter>(
    worktrees: &Arc<W>,
    agent: &AgentRecord,
) -> WorktreeState {
    match worktrees.has_uncommitted_changes(&agent.worktree).await {
        Ok(true) => return WorktreeState::Uncommitted,
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(task = %agent.task_id, error = %e, "worktree status check failed");
            return WorktreeState::Uncommitted;
        }
    }
    match worktrees.commits_ahead(&agent.worktree).await {
        Ok(n) if n > 0 => WorktreeState::CommitsAhead,
        Ok(_) => WorktreeState::Clean,
        Err(e) => {
            tracing::warn!(task = %agent.task_id, error = %e, "commit count check failed");
            WorktreeState::Clean
        }
    }
}

/// Best-effort review artifact for a dead agent's committed work, so a
/// recovery-driven `pending_merge` carries the same diff and file stats
/// as a merge-step-driven one.
async fn stage_review<W: WorktreeAdapter>(
    store: &Arc<Store>,
    worktrees: &Arc<W>,
    agent: &AgentRecord,
    now: u64,
) {
    let diff = worktrees.diff(&agent.worktree).await.unwrap_or_default();
    let summary = worktrees.status(&agent.worktree).await.unwrap_or_default();
    let file_stats = worktrees.numstat(&agent.worktree).await.unwrap_or_default();
    let conflict_files = worktrees.conflict_files(&agent.worktree).await.unwrap_or_default();
    let review = MergeReview { diff, file_stats, summary, conflict_files };
    if let Err(e) = store.stage_merge_review(&agent.task_id, &review, now) {
        tracing::warn!(task = %agent.task_id, error = %e, "failed to stage recovery merge review");
    }
}

fn settle(
    store: &Arc<Store>,
    agent: &AgentRecord,
    task_status: TaskStatus,
    wf_status: WorkflowStatus,
    now: u64,
) {
    let reason = match wf_status {
        WorkflowStatus::Blocked => "daemon_restart_with_uncommitted_work",
        _ => "pending_merge",
    };
    if let Err(e) = store.block_workflow(&agent.task_id, wf_status, reason, now) {
        tracing::warn!(task = %agent.task_id, error = %e, "workflow settle failed");
    }
    if let Err(e) = store.set_task_status(&agent.task_id, task_status, "recovery", now) {
        tracing::warn!(task = %agent.task_id, error = %e, "task settle failed");
    }
}

/// Nothing to save: fail the workflow and put the task back in the
/// queue.
fn reopen(store: &Arc<Store>, agent: &AgentRecord, now: u64) {
    if let Err(e) =
        store.set_workflow_error(&agent.task_id, WorkflowStatus::Failed, "daemon_restart", now)
    {
        tracing::warn!(task = %agent.task_id, error = %e, "workflow reopen failed");
    }
    if let Err(e) = store.release_task(&agent.task_id, now) {
        tracing::warn!(task = %agent.task_id, error = %e, "task release failed");
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
