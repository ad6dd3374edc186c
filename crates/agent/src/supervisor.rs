// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent subprocess supervisor.
//!
//! Spawns the agent in its worktree with streaming-JSONL flags and runs
//! three tasks per agent: a stdout pump, a stderr pump, and a stdin
//! writer, all talking to the supervise loop over bounded channels.
//! Every line lands in the output log with a monotonic sequence number
//! before it is classified and forwarded.

use crate::error::SubprocessError;
use crate::output::{OutputLogWriter, OutputStream};
use crate::protocol::{classify_line, extract_completion, AgentMessage, CompletionBlock};
use crate::subprocess::{send_sigkill, send_sigterm, STOP_GRACE};
use async_trait::async_trait;
use coven_core::{AgentId, Clock, TaskId};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Cap on the rolling tail kept for completion-block extraction.
const COMPLETION_TAIL_BYTES: usize = 256 * 1024;

/// How often batched output metadata is reported.
const META_INTERVAL: Duration = Duration::from_secs(1);

/// Everything needed to launch one agent subprocess.
#[derive(Debug, Clone)]
pub struct AgentSpawnConfig {
    /// Binary name, e.g. `claude`
    pub agent_command: String,
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub worktree: PathBuf,
    /// Rendered spell, passed via `-p`
    pub prompt: String,
    /// Tool allow-list forwarded to the agent
    pub allowed_tools: Vec<String>,
    pub output_path: PathBuf,
}

/// Events the supervisor reports while an agent runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Started { task_id: TaskId, pid: u32 },
    Output { task_id: TaskId, seq: u64, stream: OutputStream, data: String },
    ToolCall { task_id: TaskId, name: String },
    Question {
        task_id: TaskId,
        agent_id: AgentId,
        question_type: String,
        prompt: String,
        options: Vec<String>,
    },
    /// Batched line-count/seq metadata (at most ~1/s and at exit)
    OutputMeta { task_id: TaskId, line_count: u64, last_seq: u64 },
    Exited { task_id: TaskId, exit_code: Option<i32> },
}

/// Terminal observation of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentExit {
    pub exit_code: Option<i32>,
    /// Last fenced completion block found in the output, if any
    pub completion: Option<CompletionBlock>,
    /// True when the exit was forced by a stop/kill request
    pub killed: bool,
}

impl AgentExit {
    /// `completed` iff the completion block reports success and the
    /// process exited 0.
    pub fn succeeded(&self) -> bool {
        !self.killed
            && self.exit_code == Some(0)
            && self.completion.as_ref().map(|c| c.success).unwrap_or(false)
    }
}

/// Cloneable control surface for a running agent.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub pid: u32,
    stdin_tx: mpsc::Sender<String>,
    stop: CancellationToken,
}

impl AgentHandle {
    /// Write one reply line to the agent's stdin.
    pub async fn respond(&self, line: &str) -> Result<(), SubprocessError> {
        self.stdin_tx
            .send(line.to_string())
            .await
            .map_err(|_| SubprocessError::StdinClosed)
    }

    /// Request a graceful stop: SIGTERM, then SIGKILL after the grace
    /// period. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn for_test(
        agent_id: AgentId,
        task_id: TaskId,
        pid: u32,
        stdin_tx: mpsc::Sender<String>,
        stop: CancellationToken,
    ) -> Self {
        Self { agent_id, task_id, pid, stdin_tx, stop }
    }
}

/// A spawned agent: the control handle plus the supervise task to await.
#[derive(Debug)]
pub struct SpawnedAgent {
    pub handle: AgentHandle,
    done: tokio::task::JoinHandle<AgentExit>,
}

impl SpawnedAgent {
    /// Await the agent's terminal state.
    pub async fn wait(self) -> Result<AgentExit, SubprocessError> {
        self.done.await.map_err(|e| SubprocessError::Supervision(e.to_string()))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn for_test(handle: AgentHandle, done: tokio::task::JoinHandle<AgentExit>) -> Self {
        Self { handle, done }
    }
}

/// Spawns agent subprocesses. The fake implementation drives tests.
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<SpawnedAgent, SubprocessError>;
}

/// Real adapter: spawns the agent binary as a local subprocess.
#[derive(Clone)]
pub struct LocalAgentAdapter<C: Clock> {
    clock: C,
}

impl<C: Clock> LocalAgentAdapter<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<C: Clock> AgentAdapter for LocalAgentAdapter<C> {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<SpawnedAgent, SubprocessError> {
        // Output file exists before the subprocess starts; sequence
        // numbers continue across runs against the same task.
        let writer = Arc::new(Mutex::new(OutputLogWriter::reopen(&config.output_path)?));

        let mut cmd = tokio::process::Command::new(&config.agent_command);
        cmd.arg("-p")
            .arg(&config.prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");
        if !config.allowed_tools.is_empty() {
            cmd.arg("--allowed-tools").arg(config.allowed_tools.join(","));
        }
        cmd.current_dir(&config.worktree)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
            command: config.agent_command.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        let _ = events
            .send(AgentEvent::Started { task_id: config.task_id.clone(), pid })
            .await;

        let tail = Arc::new(Mutex::new(String::new()));
        let stop = CancellationToken::new();
        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(16);

        // stdin writer task
        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(pump_stdin(stdin, stdin_rx));
        }

        // stdout pump: log, classify, forward
        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(pump_stdout(
                stdout,
                Arc::clone(&writer),
                Arc::clone(&tail),
                events.clone(),
                config.task_id.clone(),
                config.agent_id.clone(),
                self.clock.clone(),
            ))
        });

        // stderr pump: log and forward as plain output
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(pump_stderr(
                stderr,
                Arc::clone(&writer),
                events.clone(),
                config.task_id.clone(),
                self.clock.clone(),
            ))
        });

        let handle = AgentHandle {
            agent_id: config.agent_id.clone(),
            task_id: config.task_id.clone(),
            pid,
            stdin_tx,
            stop: stop.clone(),
        };

        let done = tokio::spawn(supervise(
            child,
            pid,
            config.task_id,
            writer,
            tail,
            events,
            stop,
            stdout_task,
            stderr_task,
        ));

        Ok(SpawnedAgent { handle, done })
    }
}

async fn pump_stdin(
    mut stdin: tokio::process::ChildStdin,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(line) = rx.recv().await {
        let mut line = line;
        if !line.ends_with('\n') {
            line.push('\n');
        }
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdin.flush().await;
    }
}

async fn pump_stdout<C: Clock>(
    stdout: tokio::process::ChildStdout,
    writer: Arc<Mutex<OutputLogWriter>>,
    tail: Arc<Mutex<String>>,
    events: mpsc::Sender<AgentEvent>,
    task_id: TaskId,
    agent_id: AgentId,
    clock: C,
) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let seq = match writer.lock().append(OutputStream::Stdout, &line, clock.epoch_ms()) {
            Ok(seq) => seq,
            Err(e) => {
                tracing::warn!(task = %task_id, error = %e, "output log write failed");
                continue;
            }
        };

        let message = classify_line(&line);
        let text = match &message {
            AgentMessage::Output { text } | AgentMessage::Result { text } => text.clone(),
            _ => String::new(),
        };
        if !text.is_empty() {
            push_tail(&tail, &text);
        }

        let _ = events
            .send(AgentEvent::Output {
                task_id: task_id.clone(),
                seq,
                stream: OutputStream::Stdout,
                data: line,
            })
            .await;

        match message {
            AgentMessage::ToolCall { name } => {
                let _ = events.send(AgentEvent::ToolCall { task_id: task_id.clone(), name }).await;
            }
            AgentMessage::Question { question_type, prompt, options } => {
                let _ = events
                    .send(AgentEvent::Question {
                        task_id: task_id.clone(),
                        agent_id: agent_id.clone(),
                        question_type,
                        prompt,
                        options,
                    })
                    .await;
            }
            AgentMessage::Output { .. } | AgentMessage::Result { .. } => {}
        }
    }
}

async fn pump_stderr<C: Clock>(
    stderr: tokio::process::ChildStderr,
    writer: Arc<Mutex<OutputLogWriter>>,
    events: mpsc::Sender<AgentEvent>,
    task_id: TaskId,
    clock: C,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let seq = match writer.lock().append(OutputStream::Stderr, &line, clock.epoch_ms()) {
            Ok(seq) => seq,
            Err(e) => {
                tracing::warn!(task = %task_id, error = %e, "output log write failed");
                continue;
            }
        };
        let _ = events
            .send(AgentEvent::Output {
                task_id: task_id.clone(),
                seq,
                stream: OutputStream::Stderr,
                data: line,
            })
            .await;
    }
}

fn push_tail(tail: &Mutex<String>, text: &str) {
    let mut tail = tail.lock();
    tail.push_str(text);
    tail.push('\n');
    if tail.len() > COMPLETION_TAIL_BYTES {
        let cut = tail.len() - COMPLETION_TAIL_BYTES;
        // Keep the tail on a char boundary.
        let cut = (cut..tail.len()).find(|i| tail.is_char_boundary(*i)).unwrap_or(0);
        tail.drain(..cut);
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    mut child: tokio::process::Child,
    pid: u32,
    task_id: TaskId,
    writer: Arc<Mutex<OutputLogWriter>>,
    tail: Arc<Mutex<String>>,
    events: mpsc::Sender<AgentEvent>,
    stop: CancellationToken,
    stdout_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
) -> AgentExit {
    let mut meta = tokio::time::interval(META_INTERVAL);
    meta.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stopping = false;
    let mut killed = false;
    // Armed with a real deadline once a stop is requested.
    let kill_at = tokio::time::sleep(Duration::from_secs(30 * 24 * 3600));
    tokio::pin!(kill_at);

    let status = loop {
        tokio::select! {
            status = child.wait() => break status.ok(),
            _ = meta.tick() => {
                let (line_count, last_seq) = {
                    let writer = writer.lock();
                    (writer.line_count(), writer.next_seq().saturating_sub(1))
                };
                let _ = events
                    .send(AgentEvent::OutputMeta { task_id: task_id.clone(), line_count, last_seq })
                    .await;
            }
            _ = stop.cancelled(), if !stopping => {
                stopping = true;
                send_sigterm(pid);
                kill_at.as_mut().reset(tokio::time::Instant::now() + STOP_GRACE);
            }
            _ = &mut kill_at, if stopping && !killed => {
                killed = true;
                send_sigkill(pid);
            }
        }
    };

    // Drain the pumps so the log holds every line before Exited goes out.
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    let (line_count, last_seq) = {
        let writer = writer.lock();
        (writer.line_count(), writer.next_seq().saturating_sub(1))
    };
    let _ = events
        .send(AgentEvent::OutputMeta { task_id: task_id.clone(), line_count, last_seq })
        .await;

    let exit_code = status.and_then(|s| s.code());
    let completion = extract_completion(&tail.lock());
    let _ = events.send(AgentEvent::Exited { task_id, exit_code }).await;

    AgentExit { exit_code, completion, killed: stopping }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
