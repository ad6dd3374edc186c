// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow endpoints.

use super::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::Json;
use coven_core::Workflow;
use coven_engine::MergeDecision;
use std::sync::Arc;

/// GET /workflows
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.store.list_workflows()?))
}

/// GET /workflows/{id}: id is a task id or a workflow execution id.
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.store.find_workflow(&id)?))
}

/// POST /workflows/{id}/cancel: cooperative, idempotent.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow = state.store.find_workflow(&id)?;
    let status = state.engine.cancel(&workflow.task_id).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

/// POST /workflows/{id}/approve-merge
pub async fn approve_merge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow = state.store.find_workflow(&id)?;
    match state.engine.approve_merge(&workflow.task_id).await? {
        MergeDecision::Merged => Ok(Json(serde_json::json!({ "status": "merged" }))),
        MergeDecision::Conflicts { files } => Ok(Json(serde_json::json!({
            "status": "conflicts",
            "conflict_files": files,
        }))),
    }
}

/// POST /workflows/{id}/reject-merge
pub async fn reject_merge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow = state.store.find_workflow(&id)?;
    let status = state.engine.reject_merge(&workflow.task_id).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

/// POST /workflows/{id}/retry: resume from the failed step.
pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow = state.store.find_workflow(&id)?;
    let status = state.engine.retry(&workflow.task_id).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

/// GET /workflows/{id}/log: the execution log as JSONL.
pub async fn log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<([(axum::http::HeaderName, &'static str); 1], String), ApiError> {
    let workflow = state.store.find_workflow(&id)?;
    let path = state
        .paths
        .workflow_logs_dir
        .join(format!("{}.jsonl", workflow.id));
    let body = std::fs::read_to_string(&path)
        .map_err(|_| ApiError::NotFound(format!("no log for workflow {}", workflow.id)))?;
    Ok(([(axum::http::header::CONTENT_TYPE, "application/x-ndjson")], body))
}
