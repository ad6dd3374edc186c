// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Grimoire definitions: loading, validation, and the built-in default.

use crate::error::ConfigError;
use crate::step::{Step, StepBody};
use coven_core::duration::serde_duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// The built-in grimoire used when no matcher rule applies: one agent
/// step working from the task body, then a reviewed merge.
pub const BUILTIN_GRIMOIRE: &str = "builtin";

/// A validated workflow definition. The engine treats it as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grimoire {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Workflow-level deadline; the config default applies when unset
    #[serde(default, with = "serde_duration::opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    pub steps: Vec<Step>,
}

impl Grimoire {
    /// Parse and validate a single grimoire from YAML.
    pub fn from_yaml(path: &str, yaml: &str) -> Result<Self, ConfigError> {
        let grimoire: Grimoire = serde_yaml::from_str(yaml)
            .map_err(|source| ConfigError::Parse { path: path.to_string(), source })?;
        grimoire.validate()?;
        Ok(grimoire)
    }

    /// Validate structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| ConfigError::InvalidGrimoire {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(fail("grimoire name must not be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(fail("grimoire must declare at least one step".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        validate_steps(&self.steps, &mut seen, false).map_err(fail)
    }

    /// The built-in fallback: implement the task, then merge with review.
    pub fn builtin_default() -> Self {
        Self {
            name: BUILTIN_GRIMOIRE.to_string(),
            description: "Built-in default: one agent pass, then reviewed merge".to_string(),
            timeout: None,
            steps: vec![
                Step {
                    name: "implement".to_string(),
                    when: String::new(),
                    timeout: None,
                    on_fail: Default::default(),
                    on_success: None,
                    output: None,
                    input: Default::default(),
                    body: StepBody::Agent {
                        spell: None,
                        prompt: Some(
                            "Complete the following task in this repository.\n\n\
                             Title: {{ task.title }}\n\n{{ task.body }}\n"
                                .to_string(),
                        ),
                    },
                },
                Step {
                    name: "merge".to_string(),
                    when: String::new(),
                    timeout: None,
                    on_fail: Default::default(),
                    on_success: None,
                    output: None,
                    input: Default::default(),
                    body: StepBody::Merge { require_review: true, commit_message: None },
                },
            ],
        }
    }
}

fn validate_steps(
    steps: &[Step],
    seen: &mut std::collections::HashSet<String>,
    in_loop: bool,
) -> Result<(), String> {
    for step in steps {
        if step.name.is_empty() {
            return Err("step name must not be empty".to_string());
        }
        if !seen.insert(step.name.clone()) {
            return Err(format!("duplicate step name {:?}", step.name));
        }
        match &step.body {
            StepBody::Agent { spell, prompt } => match (spell, prompt) {
                (Some(_), Some(_)) => {
                    return Err(format!(
                        "step {:?} declares both spell and prompt",
                        step.name
                    ));
                }
                (None, None) => {
                    return Err(format!(
                        "agent step {:?} needs a spell or an inline prompt",
                        step.name
                    ));
                }
                _ => {}
            },
            StepBody::Script { command, .. } => {
                if command.trim().is_empty() {
                    return Err(format!("script step {:?} has an empty command", step.name));
                }
            }
            StepBody::Loop { steps: nested, max_iterations, .. } => {
                if in_loop {
                    return Err(format!("loop step {:?} cannot nest inside a loop", step.name));
                }
                if nested.is_empty() {
                    return Err(format!("loop step {:?} has no nested steps", step.name));
                }
                if *max_iterations == 0 {
                    return Err(format!(
                        "loop step {:?} must allow at least one iteration",
                        step.name
                    ));
                }
                validate_steps(nested, seen, true)?;
            }
            StepBody::Merge { .. } => {
                if in_loop {
                    return Err(format!(
                        "merge step {:?} cannot run inside a loop",
                        step.name
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Load every `*.yaml` grimoire in a directory.
///
/// Broken files are logged and skipped so one bad grimoire does not take
/// the daemon down.
pub fn load_dir(dir: &Path) -> Result<HashMap<String, Grimoire>, ConfigError> {
    let mut grimoires = HashMap::new();
    if !dir.exists() {
        return Ok(grimoires);
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::Read { path: dir.display().to_string(), source })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let path_display = path.display().to_string();
        let yaml = match std::fs::read_to_string(&path) {
            Ok(yaml) => yaml,
            Err(e) => {
                tracing::warn!(path = %path_display, error = %e, "skipping unreadable grimoire");
                continue;
            }
        };
        match Grimoire::from_yaml(&path_display, &yaml) {
            Ok(grimoire) => {
                grimoires.insert(grimoire.name.clone(), grimoire);
            }
            Err(e) => {
                tracing::warn!(path = %path_display, error = %e, "skipping invalid grimoire");
            }
        }
    }
    Ok(grimoires)
}

#[cfg(test)]
#[path = "grimoire_tests.rs"]
mod tests;
