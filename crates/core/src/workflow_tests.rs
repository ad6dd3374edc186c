// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    completed = { WorkflowStatus::Completed },
    cancelled = { WorkflowStatus::Cancelled },
    failed    = { WorkflowStatus::Failed },
)]
fn terminal_statuses(status: WorkflowStatus) {
    assert!(status.is_terminal());
    assert!(!status.is_resumable());
}

#[yare::parameterized(
    running       = { WorkflowStatus::Running },
    pending_merge = { WorkflowStatus::PendingMerge },
    blocked       = { WorkflowStatus::Blocked },
)]
fn resumable_statuses(status: WorkflowStatus) {
    assert!(status.is_resumable());
    assert!(!status.is_terminal());
}

#[test]
fn skipped_result_succeeds_and_continues() {
    let result = StepResult::skipped("lint", StepKind::Script);
    assert!(result.success);
    assert!(result.skipped);
    assert!(!result.failed());
    assert_eq!(result.action, StepAction::Continue);
    assert_eq!(result.duration_ms, 0);
}

#[test]
fn failed_is_false_for_skipped_steps() {
    let mut result = StepResult::skipped("lint", StepKind::Script);
    result.success = false;
    result.skipped = true;
    assert!(!result.failed());

    result.skipped = false;
    assert!(result.failed());
}

#[test]
fn workflow_roundtrips_through_serde() {
    let mut wf = Workflow::builder().build();
    wf.step_results.insert(
        "build".to_string(),
        StepResult {
            name: "build".to_string(),
            kind: StepKind::Script,
            success: true,
            skipped: false,
            output: serde_json::json!("ok\n"),
            exit_code: Some(0),
            error: None,
            duration_ms: 1200,
            action: StepAction::Continue,
        },
    );
    wf.outputs.insert("build".to_string(), serde_json::json!("ok\n"));

    let json = serde_json::to_string(&wf).unwrap();
    let parsed: Workflow = serde_json::from_str(&json).unwrap();
    assert_eq!(wf, parsed);
}

#[test]
fn merge_review_roundtrips_through_serde() {
    let review = MergeReview {
        diff: "--- a/x\n+++ b/x\n".to_string(),
        file_stats: vec![FileStat { path: "x".to_string(), additions: 3, deletions: 1 }],
        summary: "touch x".to_string(),
        conflict_files: vec![],
    };
    let json = serde_json::to_string(&review).unwrap();
    let parsed: MergeReview = serde_json::from_str(&json).unwrap();
    assert_eq!(review, parsed);
}

#[yare::parameterized(
    continue_ = { StepAction::Continue, "continue" },
    exit_loop = { StepAction::ExitLoop, "exit_loop" },
    block     = { StepAction::Block, "block" },
    fail      = { StepAction::Fail, "fail" },
)]
fn action_serializes_snake_case(action: StepAction, expected: &str) {
    assert_eq!(serde_json::to_string(&action).unwrap(), format!("\"{expected}\""));
    assert_eq!(action.to_string(), expected);
}
