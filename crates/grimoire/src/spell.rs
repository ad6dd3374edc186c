// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spell rendering: named or inline prompt templates.

use crate::error::SpellError;
use crate::template;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a spell's template text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpellSource {
    /// `spells/<name>.md`
    Named(String),
    /// Inline template from the grimoire
    Inline(String),
}

/// Renders spells against a step context.
///
/// Named spells and `{% include %}` directives resolve under the spells
/// directory.
#[derive(Debug, Clone)]
pub struct SpellRenderer {
    spells_dir: PathBuf,
}

impl SpellRenderer {
    pub fn new(spells_dir: impl Into<PathBuf>) -> Self {
        Self { spells_dir: spells_dir.into() }
    }

    /// Render a spell, merging templated `input` variables into the
    /// context as top-level variables first.
    ///
    /// Inputs are themselves templates; each is rendered against the
    /// base context, then the spell sees the merged view.
    pub fn render(
        &self,
        source: &SpellSource,
        input: &BTreeMap<String, String>,
        context: &serde_json::Value,
    ) -> Result<String, SpellError> {
        let env = template::environment_with_includes(false, &self.spells_dir);

        let context = if input.is_empty() {
            context.clone()
        } else {
            let mut merged = context.clone();
            if !merged.is_object() {
                merged = serde_json::json!({});
            }
            for (key, value_template) in input {
                let rendered = template::render(&env, value_template, context).map_err(
                    |source| SpellError::Input { key: key.clone(), source },
                )?;
                if let Some(map) = merged.as_object_mut() {
                    map.insert(key.clone(), serde_json::Value::String(rendered));
                }
            }
            merged
        };

        let (name, text) = match source {
            SpellSource::Inline(text) => ("<inline>".to_string(), text.clone()),
            SpellSource::Named(name) => (name.clone(), self.load(name)?),
        };

        template::render(&env, &text, &context)
            .map_err(|source| SpellError::Render { name, source })
    }

    /// Read a named spell file, trying the name verbatim and with the
    /// `.md` extension.
    fn load(&self, name: &str) -> Result<String, SpellError> {
        let candidates = [self.spells_dir.join(name), self.spells_dir.join(format!("{name}.md"))];
        for path in &candidates {
            if path.is_file() {
                return std::fs::read_to_string(path).map_err(|source| SpellError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
        Err(SpellError::NotFound(name.to_string()))
    }

    pub fn spells_dir(&self) -> &Path {
        &self.spells_dir
    }
}

#[cfg(test)]
#[path = "spell_tests.rs"]
mod tests;
