// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent endpoints: output delta, kill, stdin.

use super::{ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use coven_agent::{OutputLine, OutputLogReader};
use coven_core::TaskId;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct OutputQuery {
    /// Return lines with seq strictly greater than this
    #[serde(default)]
    since: u64,
}

/// GET /agents/{id}/output?since=<seq>
pub async fn output(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<OutputQuery>,
) -> Result<Json<Vec<OutputLine>>, ApiError> {
    let task_id = TaskId::from_string(&id);
    let agent = state.store.get_agent(&task_id)?;

    let mut readers = state.readers.lock();
    let reader = readers
        .entry(id.clone())
        .or_insert_with(|| OutputLogReader::new(&agent.output_path));
    let lines = reader
        .read_since(query.since)
        .map_err(|e| ApiError::Internal(format!("output read failed: {e}")))?;
    Ok(Json(lines))
}

/// POST /agents/{id}/kill
pub async fn kill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = TaskId::from_string(&id);
    state.store.get_agent(&task_id)?;
    match state.engine.agent_handle(&task_id) {
        Some(handle) => {
            handle.stop();
            Ok(Json(serde_json::json!({ "status": "stopping" })))
        }
        None => Err(ApiError::Conflict(format!("no running agent for {id}"))),
    }
}

#[derive(Deserialize)]
pub struct RespondBody {
    pub input: String,
}

/// POST /agents/{id}/respond: write a line to the agent's stdin.
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RespondBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = TaskId::from_string(&id);
    match state.engine.agent_handle(&task_id) {
        Some(handle) => {
            handle
                .respond(&body.input)
                .await
                .map_err(|e| ApiError::Conflict(e.to_string()))?;
            Ok(Json(serde_json::json!({ "status": "sent" })))
        }
        None => Err(ApiError::Conflict(format!("no running agent for {id}"))),
    }
}
