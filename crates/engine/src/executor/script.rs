// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script step: a shell command in the worktree.

use super::{ExecOutcome, StepRunner};
use crate::context::StepContext;
use coven_agent::subprocess::run_with_timeout;
use coven_agent::{AgentAdapter, SubprocessError, WorktreeAdapter};
use coven_core::{Clock, StepAction, StepResult};
use coven_grimoire::Step;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

impl<A, W, C> StepRunner<A, W, C>
where
    A: AgentAdapter,
    W: WorktreeAdapter,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn run_script(
        &self,
        step: &Step,
        command: &str,
        env: &BTreeMap<String, String>,
        workdir: Option<&Path>,
        ctx: &StepContext,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> ExecOutcome {
        let cwd = match workdir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => ctx.worktree.join(dir),
            None => ctx.worktree.clone(),
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let run = run_with_timeout(cmd, deadline, command);
        let output = tokio::select! {
            output = run => output,
            _ = cancel.cancelled() => return self.cancelled(step),
        };

        match output {
            Ok(output) => {
                // Combined output: stdout then stderr, the way a terminal
                // would interleave a short run.
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&stderr);
                }
                let exit_code = output.status.code();

                if output.status.success() {
                    ExecOutcome::plain(StepResult {
                        name: step.name.clone(),
                        kind: step.kind(),
                        success: true,
                        skipped: false,
                        output: serde_json::Value::String(text),
                        exit_code,
                        error: None,
                        duration_ms: 0,
                        action: StepAction::Continue,
                    })
                } else {
                    let mut outcome = self.failure(
                        step,
                        format!("command exited with code {}", exit_code.unwrap_or(-1)),
                        exit_code,
                        "script_failed",
                    );
                    outcome.result.output = serde_json::Value::String(text);
                    outcome
                }
            }
            Err(SubprocessError::Timeout { seconds, .. }) => self.failure(
                step,
                format!("step timed out after {seconds}s"),
                None,
                "step_timeout",
            ),
            Err(e) => self.failure(step, e.to_string(), None, "spawn_error"),
        }
    }
}
