// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent record operations.

use crate::db::{get_json, put_json, scan_json, Store, AGENTS};
use crate::error::StoreError;
use coven_core::{AgentRecord, AgentStatus, TaskId};

impl Store {
    pub fn get_agent(&self, task_id: &TaskId) -> Result<AgentRecord, StoreError> {
        let txn = self.db.begin_read()?;
        let agents = txn.open_table(AGENTS)?;
        get_json(&agents, task_id.as_str())?
            .ok_or_else(|| StoreError::AgentNotFound(task_id.to_string()))
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let agents = txn.open_table(AGENTS)?;
        scan_json(&agents)
    }

    /// Agents that were alive when the daemon last ran; candidates for
    /// orphan recovery on startup.
    pub fn running_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let mut agents = self.list_agents()?;
        agents.retain(|a| !a.status.is_terminal());
        Ok(agents)
    }

    /// Record the spawned subprocess pid and move `starting → running`
    /// once the first output arrives.
    pub fn set_agent_pid(&self, task_id: &TaskId, pid: u32) -> Result<(), StoreError> {
        self.update_agent(task_id, |agent| {
            agent.pid = pid;
        })
    }

    pub fn set_agent_status(&self, task_id: &TaskId, status: AgentStatus) -> Result<(), StoreError> {
        self.update_agent(task_id, |agent| {
            // Terminal states are written once; a late transition from a
            // racing watcher must not overwrite them.
            if !agent.status.is_terminal() {
                agent.status = status;
            }
        })
    }

    /// Batched output metadata update (at most ~1/s from the supervisor).
    pub fn update_agent_output_meta(
        &self,
        task_id: &TaskId,
        line_count: u64,
        last_seq: u64,
    ) -> Result<(), StoreError> {
        self.update_agent(task_id, |agent| {
            agent.line_count = line_count;
            agent.last_seq = last_seq;
        })
    }

    /// Reset the record for a fresh agent run (a later agent step in the
    /// same workflow). Output counters carry over; the terminal fields
    /// of the previous run are cleared.
    pub fn restart_agent(&self, task_id: &TaskId, now_ms: u64) -> Result<(), StoreError> {
        self.update_agent(task_id, |agent| {
            agent.status = AgentStatus::Starting;
            agent.pid = 0;
            agent.started_at_ms = now_ms;
            agent.ended_at_ms = None;
            agent.exit_code = None;
            agent.error = None;
        })
    }

    /// Write the terminal state exactly once.
    pub fn finish_agent(
        &self,
        task_id: &TaskId,
        status: AgentStatus,
        exit_code: Option<i32>,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<AgentRecord, StoreError> {
        debug_assert!(status.is_terminal());
        let txn = self.db.begin_write()?;
        let agent = {
            let mut agents = txn.open_table(AGENTS)?;
            let mut agent: AgentRecord = get_json(&agents, task_id.as_str())?
                .ok_or_else(|| StoreError::AgentNotFound(task_id.to_string()))?;
            if !agent.status.is_terminal() {
                agent.status = status;
                agent.exit_code = exit_code;
                agent.error = error;
                agent.ended_at_ms = Some(now_ms);
                put_json(&mut agents, task_id.as_str(), &agent)?;
            }
            agent
        };
        txn.commit()?;
        Ok(agent)
    }

    fn update_agent(
        &self,
        task_id: &TaskId,
        apply: impl FnOnce(&mut AgentRecord),
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut agents = txn.open_table(AGENTS)?;
            let mut agent: AgentRecord = get_json(&agents, task_id.as_str())?
                .ok_or_else(|| StoreError::AgentNotFound(task_id.to_string()))?;
            apply(&mut agent);
            put_json(&mut agents, task_id.as_str(), &agent)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
