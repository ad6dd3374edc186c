// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Question endpoints.

use super::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::Json;
use coven_core::{Clock, Event, EventKind, Question, QuestionId, SystemClock};
use serde::Deserialize;
use std::sync::Arc;

/// GET /questions: pending questions.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Question>>, ApiError> {
    Ok(Json(state.store.pending_questions()?))
}

#[derive(Deserialize)]
pub struct AnswerBody {
    pub answer: String,
}

/// POST /questions/{id}/answer: deliver the reply to the agent's stdin
/// and mark the question answered.
pub async fn answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Question>, ApiError> {
    let question_id = QuestionId::from_string(&id);
    let question = state.store.get_question(&question_id)?;
    if !question.is_pending() {
        return Err(ApiError::Conflict(format!("question {id} is already answered")));
    }

    // Deliver first: if the agent's stdin is gone (killed, or survived a
    // daemon restart), the question stays pending and the caller learns
    // why.
    let handle = state
        .engine
        .agent_handle(&question.task_id)
        .ok_or_else(|| ApiError::Conflict(format!("agent for {id} is not reachable")))?;
    handle
        .respond(&body.answer)
        .await
        .map_err(|e| ApiError::Conflict(e.to_string()))?;

    let now = SystemClock.epoch_ms();
    let answered = state.store.answer_question(&question_id, &body.answer, now)?;
    state.broker.publish(
        Event::new(EventKind::QuestionsAnswered, question_id.as_str(), now).with_payload(
            serde_json::json!({ "task_id": answered.task_id.as_str() }),
            coven_core::DEFAULT_MAX_PAYLOAD_BYTES,
        ),
    );
    Ok(Json(answered))
}
