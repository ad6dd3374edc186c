// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-state snapshot for `GET /state` and reconnecting clients.

use crate::db::{scan_json, Store, AGENTS, QUESTIONS, TASKS, WORKFLOWS};
use crate::error::StoreError;
use coven_core::{AgentRecord, Question, Task, Workflow};
use serde::Serialize;

/// Everything a UI client needs to render, read in one transaction so
/// the view is consistent.
#[derive(Debug, Serialize)]
pub struct StateSnapshot {
    pub tasks: Vec<Task>,
    pub agents: Vec<AgentRecord>,
    pub workflows: Vec<Workflow>,
    pub questions: Vec<Question>,
}

impl Store {
    pub fn state_snapshot(&self) -> Result<StateSnapshot, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = scan_json(&txn.open_table(TASKS)?)?;
        let agents = scan_json(&txn.open_table(AGENTS)?)?;
        let workflows = scan_json(&txn.open_table(WORKFLOWS)?)?;
        let questions = scan_json(&txn.open_table(QUESTIONS)?)?;
        Ok(StateSnapshot { tasks, agents, workflows, questions })
    }
}
