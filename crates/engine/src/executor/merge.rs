// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge step: review gate or direct commit against the target branch.

use super::{Block, ExecOutcome, StepRunner};
use crate::context::StepContext;
use coven_agent::{AgentAdapter, WorktreeAdapter, WorktreeError};
use coven_core::{Clock, MergeReview, StepAction, StepResult};
use coven_grimoire::{template, Step};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

impl<A, W, C> StepRunner<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    pub(super) async fn run_merge(
        &self,
        step: &Step,
        require_review: bool,
        commit_message: Option<&str>,
        ctx: &StepContext,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> ExecOutcome {
        let work = self.merge_inner(step, require_review, commit_message, ctx);
        tokio::select! {
            outcome = work => outcome,
            _ = tokio::time::sleep(deadline) => self.failure(
                step,
                format!("step timed out after {}s", deadline.as_secs()),
                None,
                "step_timeout",
            ),
            _ = cancel.cancelled() => self.cancelled(step),
        }
    }

    async fn merge_inner(
        &self,
        step: &Step,
        require_review: bool,
        commit_message: Option<&str>,
        ctx: &StepContext,
    ) -> ExecOutcome {
        let worktree = &ctx.worktree;

        let review = match self.build_review(ctx).await {
            Ok(review) => review,
            Err(e) => return self.failure(step, e.to_string(), None, "worktree_error"),
        };

        // Conflicts block regardless of review mode.
        if !review.conflict_files.is_empty() {
            let files = review.conflict_files.clone();
            if let Err(e) =
                self.store.stage_merge_review(&ctx.task.id, &review, self.clock.epoch_ms())
            {
                return self.failure(step, e.to_string(), None, "store_error");
            }
            let mut outcome = self.failure(step, "merge conflicts".to_string(), None, "merge_conflict");
            outcome.result.output = serde_json::json!({ "conflict_files": files });
            // Conflicts always block; on_fail:continue does not apply to
            // an unmergeable tree.
            outcome.result.action = StepAction::Block;
            outcome.block = Some(Block::Blocked("merge_conflict".to_string()));
            return outcome;
        }

        if require_review {
            // Stage the artifact and pause for approve/reject.
            if let Err(e) =
                self.store.stage_merge_review(&ctx.task.id, &review, self.clock.epoch_ms())
            {
                return self.failure(step, e.to_string(), None, "store_error");
            }
            return ExecOutcome {
                result: StepResult {
                    name: step.name.clone(),
                    kind: step.kind(),
                    success: true,
                    skipped: false,
                    output: serde_json::json!({
                        "pending_review": true,
                        "files_changed": review.file_stats.len(),
                    }),
                    exit_code: None,
                    error: None,
                    duration_ms: 0,
                    action: StepAction::Block,
                },
                block: Some(Block::PendingMerge),
            };
        }

        // No review: stage everything and commit with the rendered message.
        let message = match commit_message {
            Some(text) => {
                let env = template::environment(false);
                match template::render(&env, text, &ctx.to_value()) {
                    Ok(rendered) => rendered,
                    Err(e) => return self.failure(step, e.to_string(), None, "template_error"),
                }
            }
            None => format!("coven: {}", ctx.task.title),
        };

        if let Err(e) = self.worktrees.commit_all(worktree, &message).await {
            return self.failure(step, e.to_string(), None, "worktree_error");
        }

        ExecOutcome::plain(StepResult {
            name: step.name.clone(),
            kind: step.kind(),
            success: true,
            skipped: false,
            output: serde_json::json!({ "committed": true, "message": message }),
            exit_code: None,
            error: None,
            duration_ms: 0,
            action: StepAction::Continue,
        })
    }

    /// Diff, status, numstat, and conflict list in one artifact.
    pub(crate) async fn build_review(
        &self,
        ctx: &StepContext,
    ) -> Result<MergeReview, WorktreeError> {
        let worktree = &ctx.worktree;
        let diff = self.worktrees.diff(worktree).await?;
        let status = self.worktrees.status(worktree).await?;
        let file_stats = self.worktrees.numstat(worktree).await?;
        let conflict_files = self.worktrees.conflict_files(worktree).await?;
        Ok(MergeReview {
            diff,
            file_stats,
            summary: status,
            conflict_files,
        })
    }
}
