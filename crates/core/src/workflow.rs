// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow state machine and step results.

use crate::agent::AgentId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for one workflow execution.
    ///
    /// A task may be worked on several times (retries, re-opens); each run
    /// gets its own workflow id while the store keys the active record by
    /// task id.
    pub struct WorkflowId("wf-");
}

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    /// Paused on a merge step awaiting approve/reject
    PendingMerge,
    /// Paused on a condition that needs human attention
    Blocked,
    Completed,
    Cancelled,
    Failed,
}

crate::simple_display! {
    WorkflowStatus {
        Running => "running",
        PendingMerge => "pending_merge",
        Blocked => "blocked",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
    }
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Cancelled | WorkflowStatus::Failed
        )
    }

    /// Check if the engine should pick this workflow back up on restart.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Running | WorkflowStatus::PendingMerge | WorkflowStatus::Blocked
        )
    }
}

/// Control signal a step executor hands back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Advance to the next step
    Continue,
    /// Terminate the enclosing loop successfully
    ExitLoop,
    /// Pause the workflow (pending_merge or blocked)
    Block,
    /// Terminate the workflow as failed
    Fail,
}

crate::simple_display! {
    StepAction {
        Continue => "continue",
        ExitLoop => "exit_loop",
        Block => "block",
        Fail => "fail",
    }
}

/// Kind tag of a step, mirroring the grimoire's closed step set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Agent,
    Script,
    Loop,
    Merge,
}

crate::simple_display! {
    StepKind {
        Agent => "agent",
        Script => "script",
        Loop => "loop",
        Merge => "merge",
    }
}

/// Result of one executed (or skipped) step.
///
/// Stored inside the workflow record and broadcast as a
/// `workflow.step.completed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub kind: StepKind,
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    /// Raw text for scripts, parsed completion object for agents
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    pub action: StepAction,
}

impl StepResult {
    /// Result for a step whose `when` evaluated falsy.
    ///
    /// Skipped steps succeed, continue, and carry no timing.
    pub fn skipped(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            success: true,
            skipped: true,
            output: serde_json::Value::Null,
            exit_code: None,
            error: None,
            duration_ms: 0,
            action: StepAction::Continue,
        }
    }

    pub fn failed(&self) -> bool {
        !self.skipped && !self.success
    }
}

/// Merge-review artifact staged by a merge step awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReview {
    pub diff: String,
    /// `git diff --numstat` style per-file additions/deletions
    pub file_stats: Vec<FileStat>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub conflict_files: Vec<String>,
}

/// Per-file change stats for a merge review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// Persistent state of one workflow execution, keyed by task id.
///
/// Updated atomically with every step-result write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub task_id: TaskId,
    pub grimoire: String,
    /// Index into the grimoire's step list
    pub current_step: usize,
    pub status: WorkflowStatus,
    /// Completed step results by step name
    #[serde(default)]
    pub step_results: HashMap<String, StepResult>,
    /// Template-visible view: step name → bound output value
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<AgentId>,
    pub started_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// Staged artifact while a merge step awaits review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_review: Option<MergeReview>,
}

impl Workflow {
    /// Look up a completed step result by name.
    pub fn step_result(&self, name: &str) -> Option<&StepResult> {
        self.step_results.get(name)
    }
}

crate::builder! {
    pub struct WorkflowBuilder => Workflow {
        into {
            task_id: TaskId = "task-1",
            grimoire: String = "simple",
        }
        set {
            id: WorkflowId = WorkflowId::from_string("wf-test"),
            current_step: usize = 0,
            status: WorkflowStatus = WorkflowStatus::Running,
            step_results: HashMap<String, StepResult> = HashMap::new(),
            outputs: HashMap<String, serde_json::Value> = HashMap::new(),
            started_at_ms: u64 = 1_700_000_000_000,
            updated_at_ms: u64 = 1_700_000_000_000,
        }
        option {
            active_agent: AgentId = None,
            completed_at_ms: u64 = None,
            error: String = None,
            blocked_reason: String = None,
            merge_review: MergeReview = None,
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
