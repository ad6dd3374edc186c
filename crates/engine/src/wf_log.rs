// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow execution log: one JSONL file per workflow run.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line in the execution log.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowLogEntry<'a> {
    WorkflowStart { ts: u64, workflow: &'a str, grimoire: &'a str },
    StepStart { ts: u64, step: &'a str, index: usize },
    AgentOutput { ts: u64, step: &'a str, seq: u64, data: &'a str },
    StepEnd { ts: u64, step: &'a str, success: bool, action: &'a str },
    WorkflowBlocked { ts: u64, reason: &'a str },
    WorkflowEnd { ts: u64, status: &'a str },
}

/// Append-only logger for one workflow run.
pub struct WorkflowLogger {
    file: std::fs::File,
    path: PathBuf,
}

impl WorkflowLogger {
    /// Open (creating directories) `<logs_dir>/<workflow-id>.jsonl`.
    pub fn open(logs_dir: &Path, workflow_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{workflow_id}.jsonl"));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    /// Append one entry; failures are logged, never fatal to the
    /// workflow.
    pub fn log(&mut self, entry: &WorkflowLogEntry<'_>) {
        let Ok(mut line) = serde_json::to_vec(entry) else {
            return;
        };
        line.push(b'\n');
        if let Err(e) = self.file.write_all(&line) {
            tracing::warn!(path = %self.path.display(), error = %e, "workflow log write failed");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "wf_log_tests.rs"]
mod tests;
