// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    completed = { AgentStatus::Completed },
    failed    = { AgentStatus::Failed },
    killed    = { AgentStatus::Killed },
)]
fn terminal_statuses(status: AgentStatus) {
    assert!(status.is_terminal());
}

#[yare::parameterized(
    starting = { AgentStatus::Starting },
    running  = { AgentStatus::Running },
)]
fn live_statuses(status: AgentStatus) {
    assert!(!status.is_terminal());
}

#[test]
fn record_roundtrips_through_serde() {
    let record = AgentRecord::builder()
        .pid(4242)
        .status(AgentStatus::Running)
        .line_count(17)
        .last_seq(17)
        .build();
    let json = serde_json::to_string(&record).unwrap();
    let parsed: AgentRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, parsed);
}

#[test]
fn optional_fields_are_omitted_when_unset() {
    let record = AgentRecord::builder().build();
    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("ended_at_ms"));
    assert!(!json.contains("exit_code"));
    assert!(!json.contains("\"error\""));
}
