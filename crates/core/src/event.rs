// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope broadcast by the broker and persisted in the store.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an event.
    pub struct EventId("evt-");
}

/// Default cap on serialized event payload size.
///
/// Payloads above the cap are truncated and flagged; agent output is
/// streamed through the output log, never through events, so in practice
/// only pathological payloads hit this.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Closed set of event types, serialized with dotted names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    #[serde(rename = "workflow.step.started")]
    WorkflowStepStarted,
    #[serde(rename = "workflow.step.completed")]
    WorkflowStepCompleted,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    #[serde(rename = "workflow.blocked")]
    WorkflowBlocked,
    #[serde(rename = "workflow.pending_merge")]
    WorkflowPendingMerge,
    #[serde(rename = "workflow.cancelled")]
    WorkflowCancelled,
    #[serde(rename = "agent.started")]
    AgentStarted,
    #[serde(rename = "agent.output")]
    AgentOutput,
    #[serde(rename = "agent.question")]
    AgentQuestion,
    #[serde(rename = "agent.completed")]
    AgentCompleted,
    #[serde(rename = "agent.failed")]
    AgentFailed,
    #[serde(rename = "agent.killed")]
    AgentKilled,
    #[serde(rename = "tasks.updated")]
    TasksUpdated,
    #[serde(rename = "questions.asked")]
    QuestionsAsked,
    #[serde(rename = "questions.answered")]
    QuestionsAnswered,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "broker.overflow")]
    BrokerOverflow,
}

crate::simple_display! {
    EventKind {
        WorkflowStarted => "workflow.started",
        WorkflowStepStarted => "workflow.step.started",
        WorkflowStepCompleted => "workflow.step.completed",
        WorkflowCompleted => "workflow.completed",
        WorkflowFailed => "workflow.failed",
        WorkflowBlocked => "workflow.blocked",
        WorkflowPendingMerge => "workflow.pending_merge",
        WorkflowCancelled => "workflow.cancelled",
        AgentStarted => "agent.started",
        AgentOutput => "agent.output",
        AgentQuestion => "agent.question",
        AgentCompleted => "agent.completed",
        AgentFailed => "agent.failed",
        AgentKilled => "agent.killed",
        TasksUpdated => "tasks.updated",
        QuestionsAsked => "questions.asked",
        QuestionsAnswered => "questions.answered",
        Heartbeat => "heartbeat",
        BrokerOverflow => "broker.overflow",
    }
}

impl EventKind {
    /// Critical events are never dropped for slow subscribers; the broker
    /// sheds `agent.output` and `heartbeat` first on overflow.
    pub fn is_critical(&self) -> bool {
        !matches!(self, EventKind::AgentOutput | EventKind::Heartbeat)
    }
}

/// One event in the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    /// Id of the entity this event is about (task, workflow, agent, ...)
    pub entity: String,
    pub ts_ms: u64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// Set when the payload was cut down to the size cap
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl Event {
    pub fn new(kind: EventKind, entity: impl Into<String>, ts_ms: u64) -> Self {
        Self {
            id: EventId::new(),
            kind,
            entity: entity.into(),
            ts_ms,
            payload: serde_json::Value::Null,
            truncated: false,
        }
    }

    /// Attach a payload, truncating it to `max_bytes` when oversized.
    ///
    /// Truncation replaces the payload with a stub carrying the original
    /// size; clients re-snapshot via `GET /state` when they see the flag.
    pub fn with_payload(mut self, payload: serde_json::Value, max_bytes: usize) -> Self {
        let size = serde_json::to_string(&payload).map(|s| s.len()).unwrap_or(0);
        if size > max_bytes {
            self.payload = serde_json::json!({ "truncated_bytes": size });
            self.truncated = true;
        } else {
            self.payload = payload;
        }
        self
    }

    /// Composite store key: `type:entity:timestamp`.
    ///
    /// The timestamp is zero-padded so lexicographic order within one
    /// `type:entity:` prefix equals chronological order.
    pub fn store_key(&self) -> String {
        format!("{}:{}:{:020}", self.kind, self.entity, self.ts_ms)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
