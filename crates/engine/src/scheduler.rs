// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: polls for ready tasks and launches workflows.

use crate::engine::Engine;
use coven_agent::{AgentAdapter, OutputLogWriter, WorktreeAdapter};
use coven_core::{AgentId, Clock, EventKind, Task, TaskId};
use coven_grimoire::{Matcher, BUILTIN_GRIMOIRE};
use coven_store::{ClaimError, RetentionPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scheduler knobs, from daemon config.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub max_concurrent_agents: usize,
    /// Claims older than this are considered stale
    pub claim_timeout: Duration,
    pub stale_sweep_interval: Duration,
    pub retention_interval: Duration,
    pub retention: RetentionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_concurrent_agents: 1,
            claim_timeout: Duration::from_secs(30 * 60),
            stale_sweep_interval: Duration::from_secs(5 * 60),
            retention_interval: Duration::from_secs(60 * 60),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Polls the store, enforces the concurrency cap, claims tasks, and
/// hands workflows to the engine. Also owns the stale-claim and
/// retention sweeps.
pub struct Scheduler<A, W, C: Clock> {
    engine: Arc<Engine<A, W, C>>,
    worktrees: Arc<W>,
    matcher: Matcher,
    output_dir: PathBuf,
    clock: C,
    config: SchedulerConfig,
}

impl<A, W, C> Scheduler<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    pub fn new(
        engine: Arc<Engine<A, W, C>>,
        worktrees: Arc<W>,
        matcher: Matcher,
        output_dir: PathBuf,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self { engine, worktrees, matcher, output_dir, clock, config }
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut last_stale_sweep = self.clock.now();
        let mut last_retention = self.clock.now();

        // Recover stale claims left over from a crash before scheduling
        // anything new.
        self.stale_sweep();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => return,
            }

            if self.clock.now().duration_since(last_stale_sweep) >= self.config.stale_sweep_interval {
                last_stale_sweep = self.clock.now();
                self.stale_sweep();
            }
            if self.clock.now().duration_since(last_retention) >= self.config.retention_interval {
                last_retention = self.clock.now();
                self.retention_sweep();
            }

            self.tick().await;
        }
    }

    /// One scheduling pass: claim and launch as many ready tasks as the
    /// concurrency cap allows.
    pub async fn tick(&self) {
        let mut slots = self
            .config
            .max_concurrent_agents
            .saturating_sub(self.engine.running_count());
        if slots == 0 {
            return;
        }

        let candidates = match self.engine.store().claimable_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "failed to list claimable tasks");
                return;
            }
        };

        for task in candidates {
            if slots == 0 {
                break;
            }
            match self.engine.store().has_open_children(&task.id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(task = %task.id, error = %e, "dependency check failed");
                    continue;
                }
            }
            let Some(grimoire) = self.resolve_grimoire(&task) else {
                continue;
            };
            if self.launch(&task.id, &grimoire).await {
                slots -= 1;
            }
        }
    }

    /// Manually start one task (`POST /tasks/{id}/start`), bypassing the
    /// concurrency cap but not the claim invariants.
    pub async fn start_task(&self, task_id: &TaskId) -> Result<bool, coven_store::StoreError> {
        let task = self.engine.store().get_task(task_id)?;
        if !task.is_claimable() {
            return Ok(false);
        }
        let Some(grimoire) = self.resolve_grimoire(&task) else {
            return Ok(false);
        };
        Ok(self.launch(task_id, &grimoire).await)
    }

    /// Grimoire resolution order: explicit `grimoire:<name>` tag, then
    /// the matcher pipeline, then the built-in default.
    fn resolve_grimoire(&self, task: &Task) -> Option<String> {
        let name = task
            .tags
            .iter()
            .find_map(|tag| tag.strip_prefix("grimoire:"))
            .map(str::to_string)
            .or_else(|| self.matcher.match_task(task).map(str::to_string))
            .unwrap_or_else(|| BUILTIN_GRIMOIRE.to_string());

        if name != BUILTIN_GRIMOIRE && !self.engine.grimoires().contains_key(&name) {
            tracing::warn!(task = %task.id, grimoire = %name, "task names an unknown grimoire; skipping");
            return None;
        }
        Some(name)
    }

    /// Create the worktree and output file, claim atomically, launch.
    async fn launch(&self, task_id: &TaskId, grimoire: &str) -> bool {
        let worktree = match self.worktrees.create(task_id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(task = %task_id, error = %e, "worktree creation failed");
                return false;
            }
        };

        let output_path = self.output_dir.join(format!("{task_id}.jsonl"));
        if let Err(e) = OutputLogWriter::create(&output_path) {
            tracing::error!(task = %task_id, error = %e, "output file creation failed");
            return false;
        }

        let agent_id = AgentId::new();
        let start = match self.engine.store().claim_and_start_workflow(
            task_id,
            &agent_id,
            grimoire,
            &worktree.path,
            &worktree.branch,
            &output_path,
            self.clock.epoch_ms(),
        ) {
            Ok(start) => start,
            Err(ClaimError::Store(e)) => {
                tracing::error!(task = %task_id, error = %e, "claim transaction failed");
                return false;
            }
            Err(e) => {
                // Soft: someone else got there first, or the task moved.
                tracing::debug!(task = %task_id, error = %e, "claim skipped");
                return false;
            }
        };

        self.engine
            .emit(
                EventKind::WorkflowStarted,
                task_id.as_str(),
                serde_json::json!({
                    "workflow": start.workflow.id.as_str(),
                    "grimoire": grimoire,
                }),
            )
            .await;
        tracing::info!(task = %task_id, workflow = %start.workflow.id, grimoire, "workflow started");

        self.engine.spawn_run(task_id.clone());
        true
    }

    fn stale_sweep(&self) {
        let now = self.clock.epoch_ms();
        let cutoff = now.saturating_sub(self.config.claim_timeout.as_millis() as u64);
        match self.engine.store().release_stale_claims(cutoff, now) {
            Ok(released) if !released.is_empty() => {
                tracing::warn!(count = released.len(), "released stale claims");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "stale-claim sweep failed"),
        }
    }

    fn retention_sweep(&self) {
        match self.engine.store().retention_sweep(&self.config.retention, self.clock.epoch_ms()) {
            Ok(stats) => {
                tracing::info!(
                    soft_deleted = stats.tasks_soft_deleted,
                    hard_deleted = stats.tasks_hard_deleted,
                    workflows = stats.workflows_deleted,
                    events = stats.events_pruned,
                    "retention sweep"
                );
            }
            Err(e) => tracing::error!(error = %e, "retention sweep failed"),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
