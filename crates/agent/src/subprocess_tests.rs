// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn run_with_timeout_captures_output() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn run_with_timeout_times_out() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("sleep 5");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleeper").await.unwrap_err();
    assert!(matches!(err, crate::error::SubprocessError::Timeout { .. }));
}

#[tokio::test]
async fn run_with_timeout_reports_spawn_failure() {
    let cmd = Command::new("/definitely/not/a/binary");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing").await.unwrap_err();
    assert!(matches!(err, crate::error::SubprocessError::Spawn { .. }));
}

#[test]
fn pid_zero_is_never_alive() {
    assert!(!process_alive(0));
}

#[test]
fn own_process_is_alive_and_cmdline_readable() {
    let pid = std::process::id();
    assert!(process_alive(pid));
    // The test binary's cmdline contains its own name.
    assert!(cmdline_contains(pid, "coven"));
    assert!(!cmdline_contains(pid, "definitely-not-in-cmdline"));
}

#[tokio::test]
async fn wait_for_exit_returns_when_process_dies() {
    let mut child = Command::new("sh").arg("-c").arg("sleep 0.1").spawn().unwrap();
    let pid = child.id().unwrap();
    tokio::join!(wait_for_exit(pid, Duration::from_millis(20)), async {
        let _ = child.wait().await;
    });
    assert!(!process_alive(pid));
}
