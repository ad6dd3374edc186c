// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapters for other crates' tests (`test-support` feature).

use crate::error::{SubprocessError, WorktreeError};
use crate::output::{OutputLogWriter, OutputStream};
use crate::protocol::extract_completion;
use crate::supervisor::{
    AgentAdapter, AgentEvent, AgentExit, AgentHandle, AgentSpawnConfig, SpawnedAgent,
};
use crate::worktree::{MergeOutcome, WorktreeAdapter, WorktreeInfo};
use async_trait::async_trait;
use coven_core::{FileStat, TaskId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted agent run.
#[derive(Debug, Clone)]
pub struct FakeAgentRun {
    /// Lines "printed" by the agent, written to the real output log
    pub stdout: Vec<String>,
    pub exit_code: i32,
    /// Questions to raise before exiting
    pub questions: Vec<(String, Vec<String>)>,
}

impl FakeAgentRun {
    /// A run that ends with a successful completion block.
    pub fn succeeding(summary: &str) -> Self {
        Self {
            stdout: vec![format!(
                "```json\n{{\"success\": true, \"summary\": {}}}\n```",
                serde_json::Value::String(summary.to_string())
            )],
            exit_code: 0,
            questions: Vec::new(),
        }
    }

    /// A run that ends with a failing completion block.
    pub fn failing(error: &str) -> Self {
        Self {
            stdout: vec![format!(
                "```json\n{{\"success\": false, \"error\": {}}}\n```",
                serde_json::Value::String(error.to_string())
            )],
            exit_code: 0,
            questions: Vec::new(),
        }
    }

    /// A run that exits without any completion block.
    pub fn no_completion(exit_code: i32) -> Self {
        Self { stdout: vec!["working...".to_string()], exit_code, questions: Vec::new() }
    }
}

/// Scripted agent adapter: pops one [`FakeAgentRun`] per spawn.
#[derive(Clone, Default)]
pub struct FakeAgentAdapter {
    runs: Arc<Mutex<VecDeque<FakeAgentRun>>>,
    spawned: Arc<Mutex<Vec<AgentSpawnConfig>>>,
}

impl FakeAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_run(&self, run: FakeAgentRun) {
        self.runs.lock().push_back(run);
    }

    /// Configs of every spawn, for asserting on prompts and worktrees.
    pub fn spawned(&self) -> Vec<AgentSpawnConfig> {
        self.spawned.lock().clone()
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<SpawnedAgent, SubprocessError> {
        self.spawned.lock().push(config.clone());
        let run = self.runs.lock().pop_front().unwrap_or_else(|| FakeAgentRun::succeeding("ok"));

        let mut writer = OutputLogWriter::reopen(&config.output_path)?;
        let _ = events
            .send(AgentEvent::Started { task_id: config.task_id.clone(), pid: 0 })
            .await;

        let stop = CancellationToken::new();
        let (stdin_tx, _stdin_rx) = mpsc::channel(16);
        let handle = AgentHandle::for_test(
            config.agent_id.clone(),
            config.task_id.clone(),
            0,
            stdin_tx,
            stop,
        );

        let task_id = config.task_id.clone();
        let agent_id = config.agent_id.clone();
        let done = tokio::spawn(async move {
            let mut text = String::new();
            for line in &run.stdout {
                let seq = writer.append(OutputStream::Stdout, line, 1).unwrap_or(0);
                text.push_str(line);
                text.push('\n');
                let _ = events
                    .send(AgentEvent::Output {
                        task_id: task_id.clone(),
                        seq,
                        stream: OutputStream::Stdout,
                        data: line.clone(),
                    })
                    .await;
            }
            for (prompt, options) in &run.questions {
                let _ = events
                    .send(AgentEvent::Question {
                        task_id: task_id.clone(),
                        agent_id: agent_id.clone(),
                        question_type: "question".to_string(),
                        prompt: prompt.clone(),
                        options: options.clone(),
                    })
                    .await;
            }
            let _ = events
                .send(AgentEvent::OutputMeta {
                    task_id: task_id.clone(),
                    line_count: writer.line_count(),
                    last_seq: writer.next_seq().saturating_sub(1),
                })
                .await;
            let _ = events
                .send(AgentEvent::Exited { task_id, exit_code: Some(run.exit_code) })
                .await;

            AgentExit {
                exit_code: Some(run.exit_code),
                completion: extract_completion(&text),
                killed: false,
            }
        });

        Ok(SpawnedAgent::for_test(handle, done))
    }
}

/// Behavior knobs for the fake worktree.
#[derive(Debug, Clone, Default)]
pub struct FakeWorktreeState {
    pub diff: String,
    pub status: String,
    pub numstat: Vec<FileStat>,
    pub conflict_files: Vec<String>,
    pub commits_ahead: u32,
    pub merge_conflicts: Vec<String>,
}

/// In-memory worktree adapter.
#[derive(Clone, Default)]
pub struct FakeWorktreeAdapter {
    root: PathBuf,
    state: Arc<Mutex<FakeWorktreeState>>,
    commits: Arc<Mutex<Vec<String>>>,
    merges: Arc<Mutex<u32>>,
}

impl FakeWorktreeAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ..Default::default() }
    }

    pub fn set_state(&self, state: FakeWorktreeState) {
        *self.state.lock() = state;
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.commits.lock().clone()
    }

    pub fn merge_count(&self) -> u32 {
        *self.merges.lock()
    }
}

#[async_trait]
impl WorktreeAdapter for FakeWorktreeAdapter {
    async fn create(&self, task_id: &TaskId) -> Result<WorktreeInfo, WorktreeError> {
        let path = self.root.join(task_id.as_str());
        std::fs::create_dir_all(&path)?;
        Ok(WorktreeInfo { path, branch: format!("coven/{task_id}") })
    }

    async fn diff(&self, _worktree: &Path) -> Result<String, WorktreeError> {
        Ok(self.state.lock().diff.clone())
    }

    async fn status(&self, _worktree: &Path) -> Result<String, WorktreeError> {
        Ok(self.state.lock().status.clone())
    }

    async fn numstat(&self, _worktree: &Path) -> Result<Vec<FileStat>, WorktreeError> {
        Ok(self.state.lock().numstat.clone())
    }

    async fn conflict_files(&self, _worktree: &Path) -> Result<Vec<String>, WorktreeError> {
        Ok(self.state.lock().conflict_files.clone())
    }

    async fn has_uncommitted_changes(&self, _worktree: &Path) -> Result<bool, WorktreeError> {
        Ok(!self.state.lock().status.is_empty())
    }

    async fn commits_ahead(&self, _worktree: &Path) -> Result<u32, WorktreeError> {
        Ok(self.state.lock().commits_ahead)
    }

    async fn commit_all(&self, _worktree: &Path, message: &str) -> Result<(), WorktreeError> {
        self.commits.lock().push(message.to_string());
        Ok(())
    }

    async fn merge_to_target(&self, _worktree: &Path) -> Result<MergeOutcome, WorktreeError> {
        let conflicts = self.state.lock().merge_conflicts.clone();
        if conflicts.is_empty() {
            *self.merges.lock() += 1;
            Ok(MergeOutcome::Merged)
        } else {
            Ok(MergeOutcome::Conflicts { files: conflicts })
        }
    }

    async fn remove(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        if info.path.exists() {
            std::fs::remove_dir_all(&info.path)?;
        }
        Ok(())
    }
}
