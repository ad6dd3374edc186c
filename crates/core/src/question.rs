// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Questions an agent asks mid-run, routed to the user for answers.

use crate::agent::AgentId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a question.
    pub struct QuestionId("qst-");
}

/// Status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
}

crate::simple_display! {
    QuestionStatus {
        Pending => "pending",
        Answered => "answered",
    }
}

/// A question surfaced by an agent subprocess.
///
/// Created when the supervisor classifies a JSONL line as a question;
/// resolved when a reply is submitted through the API. Survives restarts,
/// though an agent reattached after a daemon restart can no longer
/// receive the answer on stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// Question type from the agent protocol (e.g. "choice", "confirm")
    #[serde(default)]
    pub question_type: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub status: QuestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub asked_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at_ms: Option<u64>,
}

impl Question {
    pub fn is_pending(&self) -> bool {
        self.status == QuestionStatus::Pending
    }
}

crate::builder! {
    pub struct QuestionBuilder => Question {
        into {
            task_id: TaskId = "task-1",
            question_type: String = "choice",
            prompt: String = "which approach?",
        }
        set {
            id: QuestionId = QuestionId::from_string("qst-test"),
            agent_id: AgentId = AgentId::from_string("agt-test"),
            options: Vec<String> = Vec::new(),
            status: QuestionStatus = QuestionStatus::Pending,
            asked_at_ms: u64 = 1_700_000_000_000,
        }
        option {
            response: String = None,
            answered_at_ms: u64 = None,
        }
    }
}
