// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed step definitions: the closed set of step kinds.

use coven_core::duration::serde_duration;
use coven_core::StepKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// What the engine does when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    /// Pause the workflow for human attention (the default)
    #[default]
    Block,
    /// Record the failure and keep going; `previous.failed` stays visible
    Continue,
}

/// What the engine does when a step succeeds. Only meaningful inside a
/// loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnSuccess {
    ExitLoop,
}

/// What a loop does when it runs out of iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMaxIterations {
    #[default]
    Block,
    Continue,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_require_review() -> bool {
    true
}

/// One step in a grimoire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    /// Condition template; empty means always run
    #[serde(default)]
    pub when: String,
    /// Step deadline; the kind default applies when unset
    #[serde(default, with = "serde_duration::opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub on_fail: OnFail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<OnSuccess>,
    /// Name to bind this step's raw output under in the step context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Extra variables templated against the context and injected
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, String>,
    #[serde(flatten)]
    pub body: StepBody,
}

/// Kind-specific step fields. A closed sum: adding a kind is a code
/// change, not a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepBody {
    Agent {
        /// Named spell file under `spells/`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spell: Option<String>,
        /// Inline prompt template (mutually exclusive with `spell`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    Script {
        command: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        /// Relative to the worktree root
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
    },
    Loop {
        steps: Vec<Step>,
        #[serde(default = "default_max_iterations")]
        max_iterations: u32,
        #[serde(default)]
        on_max_iterations: OnMaxIterations,
    },
    Merge {
        #[serde(default = "default_require_review")]
        require_review: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit_message: Option<String>,
    },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match &self.body {
            StepBody::Agent { .. } => StepKind::Agent,
            StepBody::Script { .. } => StepKind::Script,
            StepBody::Loop { .. } => StepKind::Loop,
            StepBody::Merge { .. } => StepKind::Merge,
        }
    }

    /// Effective deadline: the step's own timeout or the kind default.
    pub fn effective_timeout(&self, defaults: &StepTimeouts) -> Duration {
        self.timeout.unwrap_or(match self.kind() {
            StepKind::Agent => defaults.agent,
            StepKind::Script => defaults.script,
            StepKind::Merge => defaults.merge,
            // A loop has no deadline of its own; its nested steps and the
            // workflow deadline bound it.
            StepKind::Loop => defaults.workflow,
        })
    }

    pub fn exits_loop_on_success(&self) -> bool {
        self.on_success == Some(OnSuccess::ExitLoop)
    }
}

/// Kind-default deadlines, from config.
#[derive(Debug, Clone, Copy)]
pub struct StepTimeouts {
    pub agent: Duration,
    pub script: Duration,
    pub merge: Duration,
    pub workflow: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            agent: Duration::from_secs(15 * 60),
            script: Duration::from_secs(5 * 60),
            merge: Duration::from_secs(5 * 60),
            workflow: Duration::from_secs(60 * 60),
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
