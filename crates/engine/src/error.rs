// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.

use thiserror::Error;

/// Errors from workflow execution.
///
/// Step-scoped failures (spell, condition, subprocess, completion,
/// timeout) are recorded on the step result and respect `on_fail`;
/// the variants here surface when the workflow itself cannot proceed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] coven_store::StoreError),

    #[error(transparent)]
    Claim(#[from] coven_store::ClaimError),

    #[error("no grimoire named {0:?}")]
    MissingGrimoire(String),

    #[error(transparent)]
    Spell(#[from] coven_grimoire::SpellError),

    #[error(transparent)]
    Condition(#[from] coven_grimoire::ConditionError),

    #[error(transparent)]
    Subprocess(#[from] coven_agent::SubprocessError),

    #[error(transparent)]
    Worktree(#[from] coven_agent::WorktreeError),

    #[error("workflow is not awaiting merge review")]
    NotPendingMerge,

    #[error("workflow log write failed: {0}")]
    Log(#[from] std::io::Error),
}
