// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use coven_core::FakeClock;
use tempfile::TempDir;

/// Write an executable stub that stands in for the agent binary.
///
/// The stub ignores the real argument set (`-p`, `--output-format`, ...)
/// and just plays a script.
fn stub_agent(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("stub-agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

fn config(dir: &TempDir, command: String) -> AgentSpawnConfig {
    AgentSpawnConfig {
        agent_command: command,
        agent_id: coven_core::AgentId::from_string("agt-test"),
        task_id: coven_core::TaskId::from_string("task-1"),
        worktree: dir.path().to_path_buf(),
        prompt: "do the thing".to_string(),
        allowed_tools: vec!["Bash".to_string(), "Edit".to_string()],
        output_path: dir.path().join("out.jsonl"),
    }
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn successful_run_extracts_completion() {
    let dir = TempDir::new().unwrap();
    let command = stub_agent(
        &dir,
        r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"working"}]}}'
printf '```json\n{"success": true, "summary": "did it"}\n```\n'
"#,
    );

    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let spawned = adapter.spawn(config(&dir, command), tx).await.unwrap();
    let exit = spawned.wait().await.unwrap();

    assert_eq!(exit.exit_code, Some(0));
    assert!(!exit.killed);
    assert!(exit.succeeded());
    let completion = exit.completion.unwrap();
    assert_eq!(completion.summary.as_deref(), Some("did it"));

    let events = drain(rx).await;
    assert!(matches!(events.first(), Some(AgentEvent::Started { .. })));
    assert!(matches!(events.last(), Some(AgentEvent::Exited { exit_code: Some(0), .. })));
}

#[tokio::test]
async fn output_lines_are_logged_with_contiguous_seqs() {
    let dir = TempDir::new().unwrap();
    let command = stub_agent(
        &dir,
        r#"echo line-one
echo line-two 1>&2
echo line-three
"#,
    );

    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let spawned = adapter.spawn(config(&dir, command), tx).await.unwrap();
    spawned.wait().await.unwrap();
    drop(rx);

    let lines = crate::output::read_lines(&dir.path().join("out.jsonl"), 0).unwrap();
    let seqs: Vec<u64> = lines.iter().map(|l| l.seq).collect();
    assert_eq!(seqs, (1..=lines.len() as u64).collect::<Vec<_>>());
    assert_eq!(lines.len(), 3);
    assert!(lines
        .iter()
        .any(|l| l.stream == OutputStream::Stderr && l.data == "line-two"));
}

#[tokio::test]
async fn question_lines_become_question_events_and_stdin_replies_flow() {
    let dir = TempDir::new().unwrap();
    let command = stub_agent(
        &dir,
        r#"echo '{"type":"question","prompt":"Proceed?","options":["yes","no"]}'
read reply
echo "reply was $reply"
printf '```json\n{"success": true}\n```\n'
"#,
    );

    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let spawned = adapter.spawn(config(&dir, command), tx).await.unwrap();

    // Wait for the question, then answer over stdin.
    let mut question_seen = false;
    while let Some(event) = rx.recv().await {
        if let AgentEvent::Question { prompt, options, .. } = &event {
            assert_eq!(prompt, "Proceed?");
            assert_eq!(options.len(), 2);
            question_seen = true;
            spawned.handle.respond("yes").await.unwrap();
        }
        if matches!(event, AgentEvent::Exited { .. }) {
            break;
        }
    }
    assert!(question_seen);

    let exit = spawned.wait().await.unwrap();
    assert!(exit.succeeded());

    let lines = crate::output::read_lines(&dir.path().join("out.jsonl"), 0).unwrap();
    assert!(lines.iter().any(|l| l.data == "reply was yes"));
}

#[tokio::test]
async fn stop_terminates_the_subprocess() {
    let dir = TempDir::new().unwrap();
    let command = stub_agent(&dir, "echo started\nexec sleep 30\n");

    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let spawned = adapter.spawn(config(&dir, command), tx).await.unwrap();

    // Let it start, then stop it.
    while let Some(event) = rx.recv().await {
        if matches!(event, AgentEvent::Output { .. }) {
            break;
        }
    }
    spawned.handle.stop();

    let exit = spawned.wait().await.unwrap();
    assert!(exit.killed);
    assert!(!exit.succeeded());
}

#[tokio::test]
async fn spawn_failure_is_typed() {
    let dir = TempDir::new().unwrap();
    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let err = adapter
        .spawn(config(&dir, "/definitely/not/an/agent".to_string()), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SubprocessError::Spawn { .. }));
}

#[tokio::test]
async fn exit_without_completion_yields_none() {
    let dir = TempDir::new().unwrap();
    let command = stub_agent(&dir, "echo just-output\nexit 3\n");

    let adapter = LocalAgentAdapter::new(FakeClock::new());
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let spawned = adapter.spawn(config(&dir, command), tx).await.unwrap();
    let exit = spawned.wait().await.unwrap();

    assert_eq!(exit.exit_code, Some(3));
    assert!(exit.completion.is_none());
    assert!(!exit.succeeded());
}
