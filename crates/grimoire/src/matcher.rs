// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! First-match-wins rule pipeline selecting a grimoire for a task.

use crate::error::ConfigError;
use coven_core::Task;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Priority clause: an explicit list or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrioritySpec {
    List(Vec<u8>),
    Range { min: u8, max: u8 },
}

impl PrioritySpec {
    fn matches(&self, priority: u8) -> bool {
        match self {
            PrioritySpec::List(values) => values.contains(&priority),
            PrioritySpec::Range { min, max } => (*min..=*max).contains(&priority),
        }
    }
}

/// Declarative match clause. Every declared field must hold (logical
/// AND); `not_tags` is a veto evaluated last. An empty clause matches
/// every task, which is how a catch-all default rule is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchClause {
    /// Any task tag matches any of these globs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_tags: Vec<String>,
    /// Every one of these globs matches at least one task tag
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_tags: Vec<String>,
    /// No task tag matches any of these globs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PrioritySpec>,
    /// Task type is one of these
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub task_type: Vec<String>,
    /// Task body contains every one of these substrings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_parent: Option<bool>,
}

/// One matcher rule as authored in `grimoire-matchers.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    pub name: String,
    /// Target grimoire when the rule matches
    pub grimoire: String,
    #[serde(default, rename = "match")]
    pub clause: MatchClause,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct MatcherFile {
    #[serde(default)]
    rules: Vec<MatchRule>,
}

/// A rule with its glob sets compiled.
#[derive(Debug)]
struct CompiledRule {
    rule: MatchRule,
    any_tags: Option<GlobSet>,
    all_tags: Vec<GlobSet>,
    not_tags: Option<GlobSet>,
}

/// The ordered matcher pipeline.
///
/// Rules are evaluated in authoring order; the first rule whose whole
/// clause holds wins.
#[derive(Debug)]
pub struct Matcher {
    rules: Vec<CompiledRule>,
}

impl Matcher {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn new(rules: Vec<MatchRule>) -> Result<Self, ConfigError> {
        let compiled = rules.into_iter().map(compile_rule).collect::<Result<_, _>>()?;
        Ok(Self { rules: compiled })
    }

    /// Load the matcher pipeline from `grimoire-matchers.yaml`; a missing
    /// file is an empty pipeline.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let display = path.display().to_string();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
        let file: MatcherFile = serde_yaml::from_str(&yaml)
            .map_err(|source| ConfigError::Parse { path: display, source })?;
        Self::new(file.rules)
    }

    /// Resolve the grimoire for a task: the first full match, or `None`
    /// for the caller's built-in default.
    pub fn match_task(&self, task: &Task) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule_matches(rule, task))
            .map(|rule| rule.rule.grimoire.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_rule(rule: MatchRule) -> Result<CompiledRule, ConfigError> {
    let compile_set = |globs: &[String]| -> Result<Option<GlobSet>, ConfigError> {
        if globs.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for glob in globs {
            builder.add(Glob::new(glob).map_err(|e| ConfigError::InvalidRule {
                rule: rule.name.clone(),
                reason: format!("bad glob {glob:?}: {e}"),
            })?);
        }
        builder
            .build()
            .map(Some)
            .map_err(|e| ConfigError::InvalidRule { rule: rule.name.clone(), reason: e.to_string() })
    };

    let any_tags = compile_set(&rule.clause.any_tags)?;
    let not_tags = compile_set(&rule.clause.not_tags)?;
    // Each all_tags glob becomes its own set: every set must hit some tag.
    let all_tags = rule
        .clause
        .all_tags
        .iter()
        .map(|glob| {
            // compile_set returns Some for a non-empty input.
            compile_set(std::slice::from_ref(glob)).map(|set| set.unwrap_or_else(GlobSet::empty))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledRule { rule, any_tags, all_tags, not_tags })
}

fn rule_matches(rule: &CompiledRule, task: &Task) -> bool {
    let clause = &rule.rule.clause;

    if let Some(any) = &rule.any_tags {
        if !task.tags.iter().any(|tag| any.is_match(tag)) {
            return false;
        }
    }
    for set in &rule.all_tags {
        if !task.tags.iter().any(|tag| set.is_match(tag)) {
            return false;
        }
    }
    if let Some(priority) = &clause.priority {
        if !priority.matches(task.priority) {
            return false;
        }
    }
    if !clause.task_type.is_empty() && !clause.task_type.iter().any(|t| *t == task.task_type) {
        return false;
    }
    if !clause.body_contains.iter().all(|needle| task.body.contains(needle)) {
        return false;
    }
    if let Some(has_parent) = clause.has_parent {
        if task.parent.is_some() != has_parent {
            return false;
        }
    }
    // Veto last: a matching not_tag kills an otherwise-full match.
    if let Some(not) = &rule.not_tags {
        if task.tags.iter().any(|tag| not.is_match(tag)) {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
