// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn entries_append_as_jsonl() {
    let dir = TempDir::new().unwrap();
    let mut logger = WorkflowLogger::open(dir.path(), "wf-test").unwrap();
    logger.log(&WorkflowLogEntry::WorkflowStart { ts: 1, workflow: "wf-test", grimoire: "simple" });
    logger.log(&WorkflowLogEntry::StepStart { ts: 2, step: "build", index: 0 });
    logger.log(&WorkflowLogEntry::StepEnd { ts: 3, step: "build", success: true, action: "continue" });
    logger.log(&WorkflowLogEntry::WorkflowEnd { ts: 4, status: "completed" });

    let raw = std::fs::read_to_string(logger.path()).unwrap();
    let lines: Vec<serde_json::Value> =
        raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["event"], "workflow_start");
    assert_eq!(lines[1]["step"], "build");
    assert_eq!(lines[2]["action"], "continue");
    assert_eq!(lines[3]["status"], "completed");
}

#[test]
fn open_creates_log_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("logs").join("workflows");
    let logger = WorkflowLogger::open(&nested, "wf-x").unwrap();
    assert!(logger.path().exists());
}

#[test]
fn reopening_appends() {
    let dir = TempDir::new().unwrap();
    {
        let mut logger = WorkflowLogger::open(dir.path(), "wf-test").unwrap();
        logger.log(&WorkflowLogEntry::WorkflowStart { ts: 1, workflow: "wf-test", grimoire: "g" });
    }
    {
        let mut logger = WorkflowLogger::open(dir.path(), "wf-test").unwrap();
        logger.log(&WorkflowLogEntry::WorkflowEnd { ts: 2, status: "failed" });
    }
    let raw = std::fs::read_to_string(dir.path().join("wf-test.jsonl")).unwrap();
    assert_eq!(raw.lines().count(), 2);
}
