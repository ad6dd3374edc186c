// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! coven-agent: the agent subprocess supervisor and its adapters.
//!
//! Spawning, JSONL stream classification, the per-agent output log,
//! stdin routing for question replies, orphan liveness probes, and the
//! git worktree adapter.

mod error;
#[cfg(any(test, feature = "test-support"))]
mod fake;
pub mod output;
pub mod protocol;
pub mod subprocess;
mod supervisor;
mod worktree;

pub use error::{SubprocessError, WorktreeError};
pub use output::{read_lines, OutputLine, OutputLogReader, OutputLogWriter, OutputStream};
pub use protocol::{classify_line, extract_completion, AgentMessage, CompletionBlock};
pub use supervisor::{
    AgentAdapter, AgentEvent, AgentExit, AgentHandle, AgentSpawnConfig, LocalAgentAdapter,
    SpawnedAgent,
};
pub use worktree::{GitWorktreeAdapter, MergeOutcome, WorktreeAdapter, WorktreeInfo};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentAdapter, FakeAgentRun, FakeWorktreeAdapter, FakeWorktreeState};
