// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop step: nested steps with exit conditions and an iteration cap.

use super::{Block, ExecOutcome, StepRunner};
use crate::context::{LoopScope, StepContext};
use crate::wf_log::WorkflowLogger;
use coven_agent::{AgentAdapter, WorktreeAdapter};
use coven_core::{Clock, StepAction, StepResult};
use coven_grimoire::{OnMaxIterations, Step};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

impl<A, W, C> StepRunner<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) fn run_loop<'a>(
        &'a self,
        step: &'a Step,
        nested: &'a [Step],
        max_iterations: u32,
        on_max: OnMaxIterations,
        ctx: &'a StepContext,
        cancel: &'a CancellationToken,
        logger: &'a Mutex<WorkflowLogger>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ExecOutcome> + Send + 'a>> {
        Box::pin(self.run_loop_inner(step, nested, max_iterations, on_max, ctx, cancel, logger))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop_inner(
        &self,
        step: &Step,
        nested: &[Step],
        max_iterations: u32,
        on_max: OnMaxIterations,
        ctx: &StepContext,
        cancel: &CancellationToken,
        logger: &Mutex<WorkflowLogger>,
    ) -> ExecOutcome {
        // Snapshot the pre-loop context once; nested templates see it as
        // {{ loop.entry }}.
        let entry = ctx.to_value();
        let mut scope_ctx = ctx.clone();
        let mut iterations: Vec<serde_json::Value> = Vec::new();

        for iteration in 1..=max_iterations {
            scope_ctx.loop_scope = Some(LoopScope {
                name: step.name.clone(),
                iteration,
                entry: entry.clone(),
            });

            let mut iteration_results: Vec<serde_json::Value> = Vec::new();
            for inner in nested {
                if cancel.is_cancelled() {
                    return self.cancelled(step);
                }
                // Boxed: execute_step recurses through run_loop.
                let run: std::pin::Pin<Box<dyn std::future::Future<Output = ExecOutcome> + Send + '_>> =
                    Box::pin(self.execute_step(inner, &scope_ctx, cancel, logger));
                let outcome = run.await;
                let binding = inner
                    .output
                    .as_deref()
                    .map(|name| (name, outcome.result.output.clone()));
                scope_ctx.absorb(&outcome.result, binding);
                iteration_results.push(
                    serde_json::to_value(&outcome.result).unwrap_or(serde_json::Value::Null),
                );

                match outcome.result.action {
                    StepAction::Continue => {}
                    StepAction::ExitLoop => {
                        iterations.push(serde_json::Value::Array(iteration_results));
                        return ExecOutcome::plain(self.loop_result(
                            step,
                            true,
                            iteration,
                            iterations,
                            None,
                        ));
                    }
                    // Block and fail propagate straight out of the loop.
                    StepAction::Block | StepAction::Fail => {
                        let mut result = self.loop_result(
                            step,
                            false,
                            iteration,
                            {
                                iterations.push(serde_json::Value::Array(iteration_results));
                                iterations
                            },
                            outcome.result.error.clone(),
                        );
                        result.action = outcome.result.action;
                        return ExecOutcome { result, block: outcome.block };
                    }
                }
            }
            iterations.push(serde_json::Value::Array(iteration_results));
        }

        // Ran out of iterations.
        match on_max {
            OnMaxIterations::Continue => ExecOutcome::plain(self.loop_result(
                step,
                true,
                max_iterations,
                iterations,
                None,
            )),
            OnMaxIterations::Block => {
                let mut result = self.loop_result(
                    step,
                    false,
                    max_iterations,
                    iterations,
                    Some("max_iterations_reached".to_string()),
                );
                result.action = StepAction::Block;
                ExecOutcome {
                    result,
                    block: Some(Block::Blocked("max_iterations_reached".to_string())),
                }
            }
        }
    }

    /// Aggregate result: iteration count plus per-iteration step results.
    fn loop_result(
        &self,
        step: &Step,
        success: bool,
        iterations_run: u32,
        iterations: Vec<serde_json::Value>,
        error: Option<String>,
    ) -> StepResult {
        StepResult {
            name: step.name.clone(),
            kind: step.kind(),
            success,
            skipped: false,
            output: serde_json::json!({
                "iterations": iterations_run,
                "results": iterations,
            }),
            exit_code: None,
            error,
            duration_ms: 0,
            action: StepAction::Continue,
        }
    }
}
