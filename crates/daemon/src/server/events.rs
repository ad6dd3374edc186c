// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot and server-sent event stream.

use super::{ApiError, AppState};
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

/// GET /state: full snapshot for connecting clients.
pub async fn state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<coven_store::StateSnapshot>, ApiError> {
    Ok(Json(state.store.state_snapshot()?))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    /// Replay persisted events with timestamp > this, then go live
    #[serde(rename = "lastEventId", default)]
    last_event_id: u64,
}

/// GET /events?lastEventId=<ts>: replay persisted events past the
/// cursor, then stream live, as SSE. The SSE id field carries the event
/// timestamp so clients can resume with `lastEventId`.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let subscription = state.broker.subscribe(query.last_event_id)?;

    let stream = futures_util::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next().await;
        let sse = SseEvent::default()
            .id(event.ts_ms.to_string())
            .event(event.kind.to_string())
            .json_data(&event)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "event serialization failed");
                SseEvent::default().event("error")
            });
        Some((Ok::<_, Infallible>(sse), subscription))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
