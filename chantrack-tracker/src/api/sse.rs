//! Server-Sent Events stream of tracker events

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use chantrack_common::models::Dashboard;
use chantrack_common::sse::create_event_sse_stream;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Restrict the stream to one dashboard
    pub dashboard: Option<String>,
}

/// GET /events?dashboard=
///
/// Streams RunStarted, RunProgress, EntityUpdated, RunCompleted,
/// RunSuperseded and RunFailed, plus team administration events.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let dashboard = match query.dashboard.as_deref() {
        Some(d) if !d.is_empty() => Some(d.parse::<Dashboard>()?),
        _ => None,
    };
    Ok(create_event_sse_stream(&state.event_bus, dashboard))
}
