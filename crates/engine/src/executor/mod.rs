// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step executors: the common contract plus one module per step kind.

mod agent;
mod loop_step;
mod merge;
mod script;

use crate::context::StepContext;
use crate::wf_log::WorkflowLogger;
use coven_agent::{AgentAdapter, AgentHandle, WorktreeAdapter};
use coven_core::{Clock, Event, EventKind, StepAction, StepResult, TaskId};
use coven_grimoire::{ConditionEvaluator, OnFail, SpellRenderer, Step, StepBody, StepTimeouts};
use coven_store::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why a `Block` action pauses the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block {
    /// A merge step staged a review
    PendingMerge,
    /// Anything else needing human attention, with a reason
    Blocked(String),
}

/// A step result plus the engine-facing block disposition.
#[derive(Debug, Clone)]
pub(crate) struct ExecOutcome {
    pub result: StepResult,
    pub block: Option<Block>,
}

impl ExecOutcome {
    fn plain(result: StepResult) -> Self {
        Self { result, block: None }
    }
}

/// Shared dependencies for all step executors.
pub(crate) struct StepRunner<A, W, C: Clock> {
    pub store: Arc<Store>,
    pub agents: Arc<A>,
    pub worktrees: Arc<W>,
    pub spells: SpellRenderer,
    pub conditions: ConditionEvaluator,
    pub timeouts: StepTimeouts,
    pub clock: C,
    pub events: mpsc::Sender<Event>,
    pub agent_command: String,
    pub allowed_tools: Vec<String>,
    pub max_payload_bytes: usize,
    /// Live control handles by task id, for respond/kill/cancel
    pub handles: Arc<Mutex<HashMap<TaskId, AgentHandle>>>,
}

impl<A, W, C> StepRunner<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    /// Run one step under the common contract: `when` first, then the
    /// kind-specific execution with its deadline, then `on_fail` /
    /// `on_success` adjustment.
    pub(crate) async fn execute_step(
        &self,
        step: &Step,
        ctx: &StepContext,
        cancel: &CancellationToken,
        logger: &Mutex<WorkflowLogger>,
    ) -> ExecOutcome {
        match self.conditions.evaluate(&step.when, &ctx.to_value()) {
            Ok(true) => {}
            Ok(false) => {
                return ExecOutcome::plain(StepResult::skipped(&step.name, step.kind()));
            }
            Err(e) => {
                return self.failure(step, format!("{e}"), None, "condition_error");
            }
        }

        let started = self.clock.now();
        let deadline = step.effective_timeout(&self.timeouts);
        let mut outcome = match &step.body {
            StepBody::Agent { spell, prompt } => {
                self.run_agent(step, spell.as_deref(), prompt.as_deref(), ctx, deadline, cancel, logger)
                    .await
            }
            StepBody::Script { command, env, workdir } => {
                self.run_script(step, command, env, workdir.as_deref(), ctx, deadline, cancel)
                    .await
            }
            StepBody::Loop { steps, max_iterations, on_max_iterations } => {
                self.run_loop(step, steps, *max_iterations, *on_max_iterations, ctx, cancel, logger)
                    .await
            }
            StepBody::Merge { require_review, commit_message } => {
                self.run_merge(step, *require_review, commit_message.as_deref(), ctx, deadline, cancel)
                    .await
            }
        };
        outcome.result.duration_ms = started.elapsed().as_millis() as u64;

        // `on_success: exit_loop` fires only inside a loop.
        if outcome.result.success
            && outcome.result.action == StepAction::Continue
            && step.exits_loop_on_success()
            && ctx.loop_scope.is_some()
        {
            outcome.result.action = StepAction::ExitLoop;
        }
        outcome
    }

    /// Build a failure outcome for a step, honoring `on_fail`.
    pub(super) fn failure(
        &self,
        step: &Step,
        error: String,
        exit_code: Option<i32>,
        reason: &str,
    ) -> ExecOutcome {
        let (action, block) = match step.on_fail {
            OnFail::Continue => (StepAction::Continue, None),
            OnFail::Block => (StepAction::Block, Some(Block::Blocked(reason.to_string()))),
        };
        ExecOutcome {
            result: StepResult {
                name: step.name.clone(),
                kind: step.kind(),
                success: false,
                skipped: false,
                output: serde_json::Value::Null,
                exit_code,
                error: Some(error),
                duration_ms: 0,
                action,
            },
            block,
        }
    }

    /// Build a cancellation outcome: always `action = fail`.
    pub(super) fn cancelled(&self, step: &Step) -> ExecOutcome {
        ExecOutcome::plain(StepResult {
            name: step.name.clone(),
            kind: step.kind(),
            success: false,
            skipped: false,
            output: serde_json::Value::Null,
            exit_code: None,
            error: Some("cancelled".to_string()),
            duration_ms: 0,
            action: StepAction::Fail,
        })
    }

    /// Emit an event onto the broker channel (never blocks the step).
    pub(super) async fn emit(&self, kind: EventKind, entity: &str, payload: serde_json::Value) {
        let event = Event::new(kind, entity, self.clock.epoch_ms())
            .with_payload(payload, self.max_payload_bytes);
        if self.events.send(event).await.is_err() {
            tracing::debug!(kind = %kind, "event channel closed");
        }
    }
}
