// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `when` condition evaluation with documented coercion rules.

use crate::error::ConditionError;
use crate::template;

/// Evaluates step conditions against the step context.
///
/// Coercion, applied in order to the rendered string:
/// 1. case-insensitive `"true"` / `"false"` are that boolean;
/// 2. empty or whitespace-only is `false`;
/// 3. a numeric string is `true` iff non-zero;
/// 4. anything else non-empty is `true`.
///
/// Undefined variables render as the empty string (hence `false` by rule
/// 2); `strict` turns them into hard [`ConditionError`]s instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    strict: bool,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Evaluate a `when` expression against the context.
    ///
    /// The empty expression is `true` (the step always runs). Literal
    /// `true`/`false` short-circuit without touching the template engine.
    pub fn evaluate(
        &self,
        expression: &str,
        context: &serde_json::Value,
    ) -> Result<bool, ConditionError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Ok(true);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Ok(false);
        }

        let env = template::environment(self.strict);
        let rendered = template::render(&env, trimmed, context).map_err(|source| {
            ConditionError { expression: expression.to_string(), source }
        })?;
        Ok(coerce(&rendered))
    }

    /// Walk a dotted path through the context and coerce the leaf
    /// directly, bypassing the template engine.
    ///
    /// Missing segments are `false`; structured leaves (arrays, objects)
    /// are `true` when non-empty.
    pub fn evaluate_path(&self, path: &str, context: &serde_json::Value) -> bool {
        let mut node = context;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = match node {
                serde_json::Value::Object(map) => match map.get(segment) {
                    Some(v) => v,
                    None => return false,
                },
                serde_json::Value::Array(items) => match segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                {
                    Some(v) => v,
                    None => return false,
                },
                _ => return false,
            };
        }
        match node {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            serde_json::Value::String(s) => coerce(s),
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(map) => !map.is_empty(),
        }
    }
}

/// Coerce a rendered string to a boolean. See [`ConditionEvaluator`].
pub fn coerce(rendered: &str) -> bool {
    let trimmed = rendered.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return true;
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return false;
    }
    if trimmed.is_empty() {
        return false;
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        return number != 0.0;
    }
    true
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
