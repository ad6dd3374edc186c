// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step context: the template-visible view of a running workflow.
//!
//! Not persisted; rebuilt from the stored workflow state on restart.

use coven_core::{StepResult, Task, Workflow};
use serde_json::json;
use std::path::PathBuf;

/// Loop-entry snapshot and iteration counter, present inside loops.
#[derive(Debug, Clone)]
pub struct LoopScope {
    pub name: String,
    pub iteration: u32,
    /// Context value captured once when the loop was first entered
    pub entry: serde_json::Value,
}

/// Everything a step's templates can see.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub task: Task,
    pub workflow: Workflow,
    pub worktree: PathBuf,
    pub branch: String,
    /// Result of the immediately preceding step (skipped steps count)
    pub previous: Option<StepResult>,
    pub loop_scope: Option<LoopScope>,
}

impl StepContext {
    /// Rebuild the context from persisted state (resume path).
    pub fn from_workflow(task: Task, workflow: Workflow, worktree: PathBuf, branch: String) -> Self {
        Self { task, workflow, worktree, branch, previous: None, loop_scope: None }
    }

    /// Record a finished step so the next one sees it as `previous` and
    /// by name.
    pub fn absorb(&mut self, result: &StepResult, binding: Option<(&str, serde_json::Value)>) {
        self.workflow.step_results.insert(result.name.clone(), result.clone());
        if let Some((name, value)) = binding {
            self.workflow.outputs.insert(name.to_string(), value);
        }
        self.previous = Some(result.clone());
    }

    /// The JSON value templates render against.
    ///
    /// Top-level keys: `task`, `workflow`, `worktree`, `previous`,
    /// `loop`, every completed step by name, and every output binding.
    /// Reserved names win over bindings on collision.
    pub fn to_value(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();

        // Output bindings and completed steps first, so the reserved
        // keys below shadow any collisions.
        for (name, value) in &self.workflow.outputs {
            root.insert(name.clone(), value.clone());
        }
        for (name, result) in &self.workflow.step_results {
            root.insert(name.clone(), step_value(result));
        }
        // The enclosing loop is addressable by its own step name:
        // {{ <loop_name>.iteration }}.
        if let Some(scope) = &self.loop_scope {
            root.insert(scope.name.clone(), loop_value(scope));
        }

        root.insert(
            "task".to_string(),
            json!({
                "id": self.task.id.as_str(),
                "title": self.task.title,
                "body": self.task.body,
                "type": self.task.task_type,
                "priority": self.task.priority,
                "tags": self.task.tags.iter().collect::<Vec<_>>(),
            }),
        );
        root.insert(
            "workflow".to_string(),
            json!({
                "id": self.workflow.id.as_str(),
                "grimoire": self.workflow.grimoire,
            }),
        );
        root.insert("worktree".to_string(), json!(self.worktree.display().to_string()));
        root.insert("branch".to_string(), json!(self.branch));
        root.insert(
            "previous".to_string(),
            match &self.previous {
                Some(result) => step_value(result),
                None => serde_json::Value::Null,
            },
        );
        if let Some(scope) = &self.loop_scope {
            root.insert("loop".to_string(), loop_value(scope));
            root.insert("loop_entry".to_string(), scope.entry.clone());
        }

        serde_json::Value::Object(root)
    }
}

/// Template view of the enclosing loop.
fn loop_value(scope: &LoopScope) -> serde_json::Value {
    json!({
        "name": scope.name,
        "iteration": scope.iteration,
        "entry": scope.entry,
    })
}

/// Template view of one step result.
fn step_value(result: &StepResult) -> serde_json::Value {
    let mut value = json!({
        "success": result.success,
        "failed": result.failed(),
        "skipped": result.skipped,
        "output": result.output,
        "exit_code": result.exit_code,
        "error": result.error,
    });
    // Agent completion objects expose their outputs map directly:
    // {{ step_name.outputs.key }}.
    if let Some(outputs) = result.output.get("outputs") {
        if let Some(map) = value.as_object_mut() {
            map.insert("outputs".to_string(), outputs.clone());
        }
    }
    value
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
