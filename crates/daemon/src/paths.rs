// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout under `<workspace>/.coven/`.

use std::path::{Path, PathBuf};

/// All daemon paths, derived from the workspace root.
#[derive(Debug, Clone)]
pub struct CovenPaths {
    /// Repository the daemon works on
    pub workspace: PathBuf,
    /// `<workspace>/.coven`
    pub coven_dir: PathBuf,
    pub socket: PathBuf,
    pub db: PathBuf,
    pub lock: PathBuf,
    pub config: PathBuf,
    pub grimoires_dir: PathBuf,
    pub matchers: PathBuf,
    pub spells_dir: PathBuf,
    pub output_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub workflow_logs_dir: PathBuf,
    pub daemon_log: PathBuf,
}

impl CovenPaths {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let coven_dir = workspace.join(".coven");
        Self {
            socket: coven_dir.join("covend.sock"),
            db: coven_dir.join("coven.db"),
            lock: coven_dir.join("covend.pid"),
            config: coven_dir.join("config.yaml"),
            grimoires_dir: coven_dir.join("grimoires"),
            matchers: coven_dir.join("grimoire-matchers.yaml"),
            spells_dir: coven_dir.join("spells"),
            output_dir: coven_dir.join("output"),
            worktrees_dir: coven_dir.join("worktrees"),
            workflow_logs_dir: coven_dir.join("logs").join("workflows"),
            daemon_log: coven_dir.join("logs").join("covend.log"),
            coven_dir,
            workspace,
        }
    }

    /// Create every directory the daemon writes into.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.coven_dir,
            &self.grimoires_dir,
            &self.spells_dir,
            &self.output_dir,
            &self.worktrees_dir,
            &self.workflow_logs_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.daemon_log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn output_file(&self, task_id: &str) -> PathBuf {
        self.output_dir.join(format!("{task_id}.jsonl"))
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace
    }
}
