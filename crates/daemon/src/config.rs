// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (`config.yaml`).

use coven_core::duration::serde_duration;
use coven_grimoire::StepTimeouts;
use coven_store::RetentionPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Daemon configuration with per-key defaults. Unknown keys are
/// rejected so typos fail loudly at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Scheduler tick
    #[serde(default = "default_poll_interval", with = "serde_duration")]
    pub poll_interval: Duration,
    /// Cap on parallel workflows
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_agents: usize,
    /// Agent subprocess name
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Tools the agent may use
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Branch merges target
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    /// Stale-claim cutoff
    #[serde(default = "default_claim_timeout", with = "serde_duration")]
    pub claim_timeout: Duration,
    #[serde(default = "default_workflow_timeout", with = "serde_duration")]
    pub workflow_timeout: Duration,
    #[serde(default = "default_agent_step_timeout", with = "serde_duration")]
    pub agent_step_timeout: Duration,
    #[serde(default = "default_script_step_timeout", with = "serde_duration")]
    pub script_step_timeout: Duration,
    #[serde(default = "default_merge_step_timeout", with = "serde_duration")]
    pub merge_step_timeout: Duration,
    #[serde(default)]
    pub task_store: TaskStoreConfig,
    #[serde(default = "default_workflow_retention_days")]
    pub workflow_retention_days: u32,
    #[serde(default = "default_event_retention_hours")]
    pub event_retention_hours: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskStoreConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_soft_delete_days")]
    pub soft_delete_days: u32,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            soft_delete_days: default_soft_delete_days(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_max_concurrent() -> usize {
    1
}
fn default_agent_command() -> String {
    "claude".to_string()
}
fn default_allowed_tools() -> Vec<String> {
    ["Bash", "Edit", "Write", "Read", "Glob", "Grep"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_target_branch() -> String {
    "main".to_string()
}
fn default_claim_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_workflow_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}
fn default_agent_step_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}
fn default_script_step_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_merge_step_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_retention_days() -> u32 {
    30
}
fn default_soft_delete_days() -> u32 {
    7
}
fn default_workflow_retention_days() -> u32 {
    7
}
fn default_event_retention_hours() -> u32 {
    24
}

impl Default for Config {
    fn default() -> Self {
        // An empty mapping takes every default.
        #[allow(clippy::expect_used)]
        serde_yaml::from_str("{}").expect("defaults always deserialize")
    }
}

impl Config {
    /// Load from `config.yaml`; a missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigFileError::Read { path: display.clone(), source })?;
        serde_yaml::from_str(&raw)
            .map_err(|source| ConfigFileError::Parse { path: display, source })
    }

    pub fn step_timeouts(&self) -> StepTimeouts {
        StepTimeouts {
            agent: self.agent_step_timeout,
            script: self.script_step_timeout,
            merge: self.merge_step_timeout,
            workflow: self.workflow_timeout,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention_days: self.task_store.retention_days,
            soft_delete_days: self.task_store.soft_delete_days,
            workflow_retention_days: self.workflow_retention_days,
            event_retention_hours: self.event_retention_hours,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
