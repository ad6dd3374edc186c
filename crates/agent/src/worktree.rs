// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree adapter: one checkout per task, owned by one workflow.

use crate::error::WorktreeError;
use crate::subprocess::{run_with_timeout, GIT_COMMAND_TIMEOUT};
use async_trait::async_trait;
use coven_core::{FileStat, TaskId};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// A created worktree: where it lives and the branch it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Outcome of merging a worktree branch into the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflicts { files: Vec<String> },
}

/// The worktree operations the engine needs. Git is the only real
/// implementation; tests use the fake.
#[async_trait]
pub trait WorktreeAdapter: Send + Sync + 'static {
    /// Create (or reuse) the worktree for a task.
    async fn create(&self, task_id: &TaskId) -> Result<WorktreeInfo, WorktreeError>;

    /// Full diff of the worktree against the target branch.
    async fn diff(&self, worktree: &Path) -> Result<String, WorktreeError>;

    /// `git status --porcelain` of the worktree.
    async fn status(&self, worktree: &Path) -> Result<String, WorktreeError>;

    /// Per-file additions/deletions against the target branch.
    async fn numstat(&self, worktree: &Path) -> Result<Vec<FileStat>, WorktreeError>;

    /// Files that would conflict when merging into the target branch.
    async fn conflict_files(&self, worktree: &Path) -> Result<Vec<String>, WorktreeError>;

    async fn has_uncommitted_changes(&self, worktree: &Path) -> Result<bool, WorktreeError>;

    /// Commits on the worktree branch not reachable from the target.
    async fn commits_ahead(&self, worktree: &Path) -> Result<u32, WorktreeError>;

    /// Stage everything and commit with the given message.
    async fn commit_all(&self, worktree: &Path, message: &str) -> Result<(), WorktreeError>;

    /// Merge the worktree branch into the target branch.
    async fn merge_to_target(&self, worktree: &Path) -> Result<MergeOutcome, WorktreeError>;

    /// Remove the worktree and its branch (best-effort).
    async fn remove(&self, info: &WorktreeInfo) -> Result<(), WorktreeError>;
}

/// Real adapter shelling out to git.
#[derive(Debug, Clone)]
pub struct GitWorktreeAdapter {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
    target_branch: String,
}

impl GitWorktreeAdapter {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        worktrees_dir: impl Into<PathBuf>,
        target_branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktrees_dir: worktrees_dir.into(),
            target_branch: target_branch.into(),
        }
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String, WorktreeError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .args(args)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, &label).await?;
        if !output.status.success() {
            return Err(WorktreeError::Git {
                operation: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Same as [`Self::git`] but a non-zero exit is data, not an error.
    async fn git_allow_failure(
        &self,
        dir: &Path,
        args: &[&str],
    ) -> Result<(bool, String), WorktreeError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .args(args)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, &label).await?;
        Ok((output.status.success(), String::from_utf8_lossy(&output.stdout).to_string()))
    }

    fn branch_for(&self, task_id: &TaskId) -> String {
        format!("coven/{task_id}")
    }
}

#[async_trait]
impl WorktreeAdapter for GitWorktreeAdapter {
    async fn create(&self, task_id: &TaskId) -> Result<WorktreeInfo, WorktreeError> {
        let path = self.worktrees_dir.join(task_id.as_str());
        let branch = self.branch_for(task_id);
        if path.exists() {
            return Ok(WorktreeInfo { path, branch });
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path_str = path.display().to_string();
        self.git(
            &self.repo_root,
            &["worktree", "add", "-b", &branch, &path_str, &self.target_branch],
        )
        .await?;
        Ok(WorktreeInfo { path, branch })
    }

    async fn diff(&self, worktree: &Path) -> Result<String, WorktreeError> {
        self.git(worktree, &["diff", &self.target_branch]).await
    }

    async fn status(&self, worktree: &Path) -> Result<String, WorktreeError> {
        self.git(worktree, &["status", "--porcelain"]).await
    }

    async fn numstat(&self, worktree: &Path) -> Result<Vec<FileStat>, WorktreeError> {
        let raw = self.git(worktree, &["diff", "--numstat", &self.target_branch]).await?;
        Ok(parse_numstat(&raw))
    }

    async fn conflict_files(&self, worktree: &Path) -> Result<Vec<String>, WorktreeError> {
        // Trial merge: stage the target without committing, collect the
        // unmerged paths, then abort. The abort is harmless when the
        // merge was clean or a no-op.
        let (clean, _) = self
            .git_allow_failure(
                worktree,
                &["merge", "--no-commit", "--no-ff", &self.target_branch],
            )
            .await?;
        let files = if clean {
            Vec::new()
        } else {
            let raw = self.git(worktree, &["diff", "--name-only", "--diff-filter=U"]).await?;
            raw.lines().filter(|l| !l.is_empty()).map(str::to_string).collect()
        };
        self.git_allow_failure(worktree, &["merge", "--abort"]).await?;
        Ok(files)
    }

    async fn has_uncommitted_changes(&self, worktree: &Path) -> Result<bool, WorktreeError> {
        Ok(!self.status(worktree).await?.trim().is_empty())
    }

    async fn commits_ahead(&self, worktree: &Path) -> Result<u32, WorktreeError> {
        let range = format!("{}..HEAD", self.target_branch);
        let raw = self.git(worktree, &["rev-list", "--count", &range]).await?;
        Ok(raw.trim().parse().unwrap_or(0))
    }

    async fn commit_all(&self, worktree: &Path, message: &str) -> Result<(), WorktreeError> {
        self.git(worktree, &["add", "-A"]).await?;
        let (_committed, _) =
            self.git_allow_failure(worktree, &["commit", "-m", message]).await?;
        // A no-change commit exits non-zero; that is fine, merge proceeds
        // with whatever is already committed.
        Ok(())
    }

    async fn merge_to_target(&self, worktree: &Path) -> Result<MergeOutcome, WorktreeError> {
        // Bring the target into the worktree branch first; conflicts stop
        // here with the working tree cleaned up.
        let (merged, _) = self
            .git_allow_failure(worktree, &["merge", "--no-edit", &self.target_branch])
            .await?;
        if !merged {
            let raw =
                self.git(worktree, &["diff", "--name-only", "--diff-filter=U"]).await?;
            let files: Vec<String> =
                raw.lines().filter(|l| !l.is_empty()).map(str::to_string).collect();
            self.git_allow_failure(worktree, &["merge", "--abort"]).await?;
            return Ok(MergeOutcome::Conflicts { files });
        }

        // Target is now an ancestor of the worktree branch: fast-forward
        // it. When the root checkout sits on the target a plain ff merge
        // also updates its working tree; otherwise move the ref directly
        // (a checked-out branch cannot be pushed over).
        let branch = self.git(worktree, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let branch = branch.trim();
        let head = self.git(&self.repo_root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if head.trim() == self.target_branch {
            self.git(&self.repo_root, &["merge", "--ff-only", branch]).await?;
        } else {
            let refspec = format!("{branch}:{}", self.target_branch);
            self.git(&self.repo_root, &["fetch", ".", &refspec]).await?;
        }
        Ok(MergeOutcome::Merged)
    }

    async fn remove(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        let path_str = info.path.display().to_string();
        self.git_allow_failure(
            &self.repo_root,
            &["worktree", "remove", "--force", &path_str],
        )
        .await?;
        self.git_allow_failure(&self.repo_root, &["branch", "-D", &info.branch]).await?;
        if info.path.exists() {
            tokio::fs::remove_dir_all(&info.path).await?;
        }
        Ok(())
    }
}

fn parse_numstat(raw: &str) -> Vec<FileStat> {
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let additions = parts.next()?.trim();
            let deletions = parts.next()?.trim();
            let path = parts.next()?.trim();
            Some(FileStat {
                path: path.to_string(),
                // Binary files show "-"; count them as zero.
                additions: additions.parse().unwrap_or(0),
                deletions: deletions.parse().unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
