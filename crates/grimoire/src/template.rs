// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single template language used by spells and conditions.
//!
//! minijinja with the default filter set (`upper`, `lower`, `trim`,
//! `join`, `indent`, `default`, comparison and boolean operators) plus a
//! `quote` filter, and `{% include %}` resolved against the spells
//! directory when one is configured. Undefined variables render as the
//! empty string unless strict mode is on.

use minijinja::{Environment, UndefinedBehavior};
use std::path::Path;

/// Build the shared template environment.
pub fn environment(strict: bool) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(if strict {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Lenient
    });
    env.add_filter("quote", quote);
    env
}

/// Build an environment whose `{% include %}` loads from `dir`.
pub fn environment_with_includes(strict: bool, dir: &Path) -> Environment<'static> {
    let mut env = environment(strict);
    env.set_loader(minijinja::path_loader(dir));
    env
}

/// Render a one-off template string against a JSON context.
pub fn render(
    env: &Environment<'_>,
    template: &str,
    context: &serde_json::Value,
) -> Result<String, minijinja::Error> {
    env.render_str(template, context)
}

/// Shell-style quoting filter: `{{ value | quote }}`.
fn quote(value: String) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
