// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from grimoire loading, matching, and rendering.

use thiserror::Error;

/// Invalid grimoire or matcher artifacts.
///
/// The daemon logs these at load time and continues without the broken
/// artifact; a task that matches nothing falls back to the built-in
/// default grimoire.
#[derive(Debug, Error)]
pub enum ConfigError {
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

    #[error("grimoire {name:?}: {reason}")]
    InvalidGrimoire { name: String, reason: String },

    #[error("matcher rule {rule:?}: {reason}")]
    InvalidRule { rule: String, reason: String },
}

/// Spell lookup or render failures. Marks the step failed.
#[derive(Debug, Error)]
pub enum SpellError {
    #[error("spell not found: {0}")]
    NotFound(String),

    #[error("failed to read spell {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render spell {name:?}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render input {key:?}: {source}")]
    Input {
        key: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Malformed `when` expression. Marks the step failed, respecting
/// `on_fail`.
#[derive(Debug, Error)]
#[error("invalid condition {expression:?}: {source}")]
pub struct ConditionError {
    pub expression: String,
    #[source]
    pub source: minijinja::Error,
}
