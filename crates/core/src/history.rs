// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit-log entries for task mutations.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// One auditable field change on a task.
///
/// Written for status, claim, and parent mutations; pruned together with
/// the task during the retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: TaskId,
    pub field: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    pub changed_at_ms: u64,
    /// "scheduler", "engine", an agent id, or "api"
    #[serde(default)]
    pub changed_by: String,
}

impl HistoryEntry {
    pub fn new(
        task_id: TaskId,
        field: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        changed_at_ms: u64,
        changed_by: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            field: field.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            changed_at_ms,
            changed_by: changed_by.into(),
        }
    }
}
