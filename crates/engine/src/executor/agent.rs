// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent step: render the spell, run the agent, read its completion.

use super::{ExecOutcome, StepRunner};
use crate::context::StepContext;
use crate::wf_log::{WorkflowLogEntry, WorkflowLogger};
use coven_agent::{AgentAdapter, AgentEvent, AgentExit, AgentSpawnConfig, WorktreeAdapter};
use coven_core::{
    AgentStatus, Clock, EventKind, Question, QuestionId, QuestionStatus, StepAction, StepResult,
};
use coven_grimoire::{Step, SpellSource};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How the agent run ended, before completion-block interpretation.
enum RunEnd {
    Finished(AgentExit),
    TimedOut,
    Cancelled,
}

impl<A, W, C> StepRunner<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn run_agent(
        &self,
        step: &Step,
        spell: Option<&str>,
        prompt: Option<&str>,
        ctx: &StepContext,
        deadline: Duration,
        cancel: &CancellationToken,
        logger: &Mutex<WorkflowLogger>,
    ) -> ExecOutcome {
        let source = match (spell, prompt) {
            (Some(name), _) => SpellSource::Named(name.to_string()),
            (_, Some(text)) => SpellSource::Inline(text.to_string()),
            // Validation rejects this; belt and suspenders for hand-built steps.
            (None, None) => {
                return self.failure(step, "agent step has no spell".to_string(), None, "spell_error");
            }
        };

        let rendered = match self.spells.render(&source, &step.input, &ctx.to_value()) {
            Ok(rendered) => rendered,
            Err(e) => return self.failure(step, e.to_string(), None, "spell_error"),
        };

        let task_id = ctx.task.id.clone();
        let agent = match self.store.get_agent(&task_id) {
            Ok(agent) => agent,
            Err(e) => return self.failure(step, e.to_string(), None, "store_error"),
        };
        if let Err(e) = self.store.restart_agent(&task_id, self.clock.epoch_ms()) {
            return self.failure(step, e.to_string(), None, "store_error");
        }

        let config = AgentSpawnConfig {
            agent_command: self.agent_command.clone(),
            agent_id: agent.id.clone(),
            task_id: task_id.clone(),
            worktree: ctx.worktree.clone(),
            prompt: rendered,
            allowed_tools: self.allowed_tools.clone(),
            output_path: agent.output_path.clone(),
        };

        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(256);
        let spawned = match self.agents.spawn(config, event_tx).await {
            Ok(spawned) => spawned,
            Err(e) => {
                let _ = self.store.finish_agent(
                    &task_id,
                    AgentStatus::Failed,
                    None,
                    Some(e.to_string()),
                    self.clock.epoch_ms(),
                );
                return self.failure(step, e.to_string(), None, "spawn_error");
            }
        };

        let handle = spawned.handle.clone();
        self.handles.lock().insert(task_id.clone(), handle.clone());

        let wait = spawned.wait();
        tokio::pin!(wait);
        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);

        let mut saw_output = false;
        let mut timed_out = false;
        let mut cancelling = false;

        let end = loop {
            tokio::select! {
                exit = &mut wait => {
                    match exit {
                        Ok(_) if timed_out => break RunEnd::TimedOut,
                        Ok(_) if cancelling => break RunEnd::Cancelled,
                        Ok(exit) => break RunEnd::Finished(exit),
                        Err(e) => {
                            let _ = self.store.finish_agent(
                                &task_id,
                                AgentStatus::Failed,
                                None,
                                Some(e.to_string()),
                                self.clock.epoch_ms(),
                            );
                            self.handles.lock().remove(&task_id);
                            return self.failure(step, e.to_string(), None, "supervision_error");
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    self.handle_agent_event(event, &step.name, &mut saw_output, logger).await;
                }
                _ = &mut timeout, if !timed_out && !cancelling => {
                    timed_out = true;
                    handle.stop();
                }
                _ = cancel.cancelled(), if !cancelling && !timed_out => {
                    cancelling = true;
                    handle.stop();
                }
            }
        };

        // Drain buffered events so the log and store are complete.
        while let Ok(event) = event_rx.try_recv() {
            self.handle_agent_event(event, &step.name, &mut saw_output, logger).await;
        }
        self.handles.lock().remove(&task_id);

        let now = self.clock.epoch_ms();
        let entity = task_id.as_str().to_string();
        match end {
            RunEnd::TimedOut => {
                let _ = self.store.finish_agent(
                    &task_id,
                    AgentStatus::Killed,
                    None,
                    Some("step timed out".to_string()),
                    now,
                );
                self.emit(EventKind::AgentKilled, &entity, serde_json::json!({"reason": "timeout"}))
                    .await;
                self.failure(
                    step,
                    format!("step timed out after {}s", deadline.as_secs()),
                    None,
                    "step_timeout",
                )
            }
            RunEnd::Cancelled => {
                let _ = self.store.finish_agent(
                    &task_id,
                    AgentStatus::Killed,
                    None,
                    Some("cancelled".to_string()),
                    now,
                );
                self.emit(EventKind::AgentKilled, &entity, serde_json::json!({"reason": "cancelled"}))
                    .await;
                self.cancelled(step)
            }
            RunEnd::Finished(exit) if exit.killed => {
                let _ = self.store.finish_agent(
                    &task_id,
                    AgentStatus::Killed,
                    exit.exit_code,
                    Some("killed".to_string()),
                    now,
                );
                self.emit(EventKind::AgentKilled, &entity, serde_json::json!({"reason": "killed"}))
                    .await;
                self.failure(step, "agent killed".to_string(), exit.exit_code, "agent_killed")
            }
            RunEnd::Finished(exit) => {
                self.interpret_exit(step, &task_id, exit, now).await
            }
        }
    }

    /// Map a natural exit to a step result via the completion contract.
    async fn interpret_exit(
        &self,
        step: &Step,
        task_id: &coven_core::TaskId,
        exit: AgentExit,
        now: u64,
    ) -> ExecOutcome {
        let entity = task_id.as_str().to_string();
        match &exit.completion {
            None => {
                let error = "agent output did not contain valid JSON block".to_string();
                let _ = self.store.finish_agent(
                    task_id,
                    AgentStatus::Failed,
                    exit.exit_code,
                    Some(error.clone()),
                    now,
                );
                self.emit(EventKind::AgentFailed, &entity, serde_json::json!({"error": error}))
                    .await;
                self.failure(step, error, exit.exit_code, "agent_completion")
            }
            Some(completion) if !completion.success => {
                let error = completion
                    .error
                    .clone()
                    .unwrap_or_else(|| "agent reported failure".to_string());
                let _ = self.store.finish_agent(
                    task_id,
                    AgentStatus::Failed,
                    exit.exit_code,
                    Some(error.clone()),
                    now,
                );
                self.emit(EventKind::AgentFailed, &entity, serde_json::json!({"error": error}))
                    .await;
                let mut outcome = self.failure(step, error, exit.exit_code, "agent_failed");
                outcome.result.output = completion.to_value();
                outcome
            }
            Some(completion) if exit.exit_code != Some(0) => {
                let error = format!(
                    "agent exited with code {}",
                    exit.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
                );
                let _ = self.store.finish_agent(
                    task_id,
                    AgentStatus::Failed,
                    exit.exit_code,
                    Some(error.clone()),
                    now,
                );
                self.emit(EventKind::AgentFailed, &entity, serde_json::json!({"error": error}))
                    .await;
                let mut outcome = self.failure(step, error, exit.exit_code, "agent_failed");
                outcome.result.output = completion.to_value();
                outcome
            }
            Some(completion) => {
                let _ =
                    self.store.finish_agent(task_id, AgentStatus::Completed, exit.exit_code, None, now);
                self.emit(
                    EventKind::AgentCompleted,
                    &entity,
                    serde_json::json!({"summary": completion.summary}),
                )
                .await;
                ExecOutcome::plain(StepResult {
                    name: step.name.clone(),
                    kind: step.kind(),
                    success: true,
                    skipped: false,
                    output: completion.to_value(),
                    exit_code: exit.exit_code,
                    error: None,
                    duration_ms: 0,
                    action: StepAction::Continue,
                })
            }
        }
    }

    async fn handle_agent_event(
        &self,
        event: AgentEvent,
        step_name: &str,
        saw_output: &mut bool,
        logger: &Mutex<WorkflowLogger>,
    ) {
        match event {
            AgentEvent::Started { task_id, pid } => {
                let _ = self.store.set_agent_pid(&task_id, pid);
                self.emit(
                    EventKind::AgentStarted,
                    task_id.as_str(),
                    serde_json::json!({"pid": pid}),
                )
                .await;
            }
            AgentEvent::Output { task_id, seq, stream, data } => {
                if !*saw_output {
                    *saw_output = true;
                    let _ = self.store.set_agent_status(&task_id, AgentStatus::Running);
                }
                logger.lock().log(&WorkflowLogEntry::AgentOutput {
                    ts: self.clock.epoch_ms(),
                    step: step_name,
                    seq,
                    data: &data,
                });
                self.emit(
                    EventKind::AgentOutput,
                    task_id.as_str(),
                    serde_json::json!({"seq": seq, "stream": stream.to_string(), "data": data}),
                )
                .await;
            }
            AgentEvent::ToolCall { task_id, name } => {
                tracing::debug!(task = %task_id, tool = %name, "agent tool call");
            }
            AgentEvent::Question { task_id, agent_id, question_type, prompt, options } => {
                let question = Question {
                    id: QuestionId::new(),
                    task_id: task_id.clone(),
                    agent_id,
                    question_type,
                    prompt,
                    options,
                    status: QuestionStatus::Pending,
                    response: None,
                    asked_at_ms: self.clock.epoch_ms(),
                    answered_at_ms: None,
                };
                if let Err(e) = self.store.create_question(&question) {
                    tracing::warn!(task = %task_id, error = %e, "failed to persist question");
                    return;
                }
                let payload = serde_json::json!({
                    "question_id": question.id.as_str(),
                    "prompt": question.prompt,
                    "options": question.options,
                });
                self.emit(EventKind::AgentQuestion, task_id.as_str(), payload.clone()).await;
                self.emit(EventKind::QuestionsAsked, question.id.as_str(), payload).await;
            }
            AgentEvent::OutputMeta { task_id, line_count, last_seq } => {
                let _ = self.store.update_agent_output_meta(&task_id, line_count, last_seq);
            }
            AgentEvent::Exited { .. } => {}
        }
    }
}
