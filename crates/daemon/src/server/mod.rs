// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API served over the Unix socket.

mod agents;
mod events;
mod questions;
mod tasks;
mod workflows;

use crate::broker::Broker;
use crate::lifecycle::{DaemonEngine, DaemonScheduler};
use crate::paths::CovenPaths;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use coven_agent::OutputLogReader;
use coven_core::SystemClock;
use coven_engine::EngineError;
use coven_store::{ClaimError, Store, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared context for all request handlers.
pub struct AppState {
    pub store: Arc<Store>,
    pub broker: Arc<Broker<SystemClock>>,
    pub engine: Arc<DaemonEngine>,
    pub scheduler: Arc<DaemonScheduler>,
    pub paths: CovenPaths,
    /// Per-file seq index for `?since=` output reads
    pub readers: Mutex<HashMap<String, OutputLogReader>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(events::state))
        .route("/events", get(events::stream))
        .route("/workflows", get(workflows::list))
        .route("/workflows/{id}", get(workflows::detail))
        .route("/workflows/{id}/cancel", post(workflows::cancel))
        .route("/workflows/{id}/approve-merge", post(workflows::approve_merge))
        .route("/workflows/{id}/reject-merge", post(workflows::reject_merge))
        .route("/workflows/{id}/retry", post(workflows::retry))
        .route("/workflows/{id}/log", get(workflows::log))
        .route("/tasks/{id}", get(tasks::detail))
        .route("/tasks/{id}/start", post(tasks::start))
        .route("/tasks/{id}/stop", post(tasks::stop))
        .route("/agents/{id}/output", get(agents::output))
        .route("/agents/{id}/kill", post(agents::kill))
        .route("/agents/{id}/respond", post(agents::respond))
        .route("/questions", get(questions::list))
        .route("/questions/{id}/answer", post(questions::answer))
        .with_state(state)
}

/// API error envelope with status mapping.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound(_)
            | StoreError::AgentNotFound(_)
            | StoreError::WorkflowNotFound(_)
            | StoreError::QuestionNotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::CyclicParent { .. } => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(inner) => inner.into(),
            EngineError::NotPendingMerge => ApiError::Conflict(e.to_string()),
            EngineError::Claim(ClaimError::NotFound(m)) => ApiError::NotFound(m),
            EngineError::Claim(inner) => ApiError::Conflict(inner.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
