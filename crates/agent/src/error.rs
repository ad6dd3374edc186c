// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from the agent supervisor and worktree adapter.

use thiserror::Error;

/// Subprocess lifecycle failures. Marks the step failed.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command:?} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("agent stdin is closed")]
    StdinClosed,

    #[error("agent supervision task failed: {0}")]
    Supervision(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Git worktree operation failures.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("git {operation} failed: {stderr}")]
    Git { operation: String, stderr: String },

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
