// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task endpoints.

use super::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::Json;
use coven_core::{Task, TaskId};
use std::sync::Arc;

/// GET /tasks/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.store.get_task(&TaskId::from_string(&id))?))
}

/// POST /tasks/{id}/start: manual start, bypassing the concurrency cap.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = TaskId::from_string(&id);
    // Surface not-found as such before attempting the claim.
    state.store.get_task(&task_id)?;
    let started = state.scheduler.start_task(&task_id).await?;
    if started {
        Ok(Json(serde_json::json!({ "status": "started" })))
    } else {
        Err(ApiError::Conflict(format!("task {id} is not claimable")))
    }
}

/// POST /tasks/{id}/stop: cancel the running workflow for the task.
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = TaskId::from_string(&id);
    let status = state.engine.cancel(&task_id).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}
