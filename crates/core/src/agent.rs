// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent record: one row per agent subprocess, keyed by its task.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for an agent subprocess instance.
    pub struct AgentId("agt-");
}

/// Status of an agent subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Record created; subprocess not yet producing output
    Starting,
    /// Subprocess produced its first output line
    Running,
    /// Exited cleanly with a successful completion block
    Completed,
    /// Exited without success (crash, bad completion, non-zero exit)
    Failed,
    /// Explicitly killed via the API or a cancel
    Killed,
}

crate::simple_display! {
    AgentStatus {
        Starting => "starting",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Killed => "killed",
    }
}

impl AgentStatus {
    /// Check if this status is terminal. Terminal states are written once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Killed)
    }
}

/// Persistent record of an agent subprocess.
///
/// Created atomically with the task claim; the output file exists before
/// the subprocess starts. The record is keyed by task id in the store,
/// one agent per task at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub task_id: TaskId,
    /// OS process id, 0 until spawned
    #[serde(default)]
    pub pid: u32,
    pub status: AgentStatus,
    pub worktree: PathBuf,
    #[serde(default)]
    pub branch: String,
    /// Path to the JSONL output log
    pub output_path: PathBuf,
    /// Number of lines written to the output log (batched metadata)
    #[serde(default)]
    pub line_count: u64,
    /// Last sequence number written to the output log (batched metadata)
    #[serde(default)]
    pub last_seq: u64,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

crate::builder! {
    pub struct AgentRecordBuilder => AgentRecord {
        into {
            task_id: TaskId = "task-1",
            branch: String = "coven/task-1",
        }
        set {
            id: AgentId = AgentId::from_string("agt-test"),
            pid: u32 = 0,
            status: AgentStatus = AgentStatus::Starting,
            worktree: PathBuf = PathBuf::from("/tmp/worktree"),
            output_path: PathBuf = PathBuf::from("/tmp/output.jsonl"),
            line_count: u64 = 0,
            last_seq: u64 = 0,
            started_at_ms: u64 = 1_700_000_000_000,
        }
        option {
            ended_at_ms: u64 = None,
            exit_code: i32 = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
