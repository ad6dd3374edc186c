// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess helpers shared by the supervisor and the worktree adapter.

use crate::error::SubprocessError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Deadline for short git invocations.
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period between SIGTERM and SIGKILL.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Run a command to completion with a deadline, capturing output.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    let fut = cmd.output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|source| SubprocessError::Spawn {
            command: label.to_string(),
            source,
        }),
        Err(_) => Err(SubprocessError::Timeout {
            command: label.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

/// Check whether a process is still running (signal 0 probe).
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Check whether the process's command line mentions `needle`.
///
/// Reads `/proc/<pid>/cmdline`; on platforms or failures where that is
/// unavailable the answer is `false`, which the orphan recovery treats
/// as "not our agent".
pub fn cmdline_contains(pid: u32, needle: &str) -> bool {
    let path = format!("/proc/{pid}/cmdline");
    match std::fs::read(path) {
        Ok(raw) => String::from_utf8_lossy(&raw).contains(needle),
        Err(_) => false,
    }
}

/// Send SIGTERM to a process group leader.
pub fn send_sigterm(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

/// Send SIGKILL.
pub fn send_sigkill(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

/// Poll until a process we do not own exits (reattached orphans).
pub async fn wait_for_exit(pid: u32, poll: Duration) {
    while process_alive(pid) {
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
