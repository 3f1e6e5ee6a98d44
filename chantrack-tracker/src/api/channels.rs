//! Channel dashboard handlers
//!
//! POST /channels/runs, GET /channels, GET /channels/:id/members

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chantrack_common::models::{Dashboard, ResolvedMembers};
use serde::Deserialize;

use super::{record_error, DashboardResponse, SortQuery};
use crate::client::ChannelFilter;
use crate::error::{ApiError, ApiResult};
use crate::services::RunTicket;
use crate::AppState;

/// POST /channels/runs request (body optional)
#[derive(Debug, Default, Deserialize)]
pub struct StartChannelRunRequest {
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /channels/runs
///
/// Fetch the channel list and start enriching it. Returns 202 with the run
/// identity; progress follows on the event stream.
pub async fn start_channel_run(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RunTicket>)> {
    let request: StartChannelRunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartChannelRunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let filter = ChannelFilter {
        channel_name: request.channel_name,
        description: request.description,
    };

    match state.runs.start_channel_run(filter).await {
        Ok(ticket) => Ok((StatusCode::ACCEPTED, Json(ticket))),
        Err(e) => {
            let err = ApiError::from(e);
            record_error(&state, &err).await;
            Err(err)
        }
    }
}

/// GET /channels?sort=&direction=
pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<SortQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let (key, direction) = query.parse()?;
    let snapshot = state.dashboards.sorted(Dashboard::Channels, key, direction);
    Ok(Json(snapshot.into()))
}

/// GET /channels/:id/members
///
/// Resolves every member id one lookup at a time.
pub async fn channel_members(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<ResolvedMembers>> {
    let member_ids = state
        .backend
        .channel_member_ids(&channel_id)
        .await
        .ok_or_else(|| ApiError::Upstream(format!("Members of channel {} unavailable", channel_id)))?;

    tracing::debug!(channel_id = %channel_id, count = member_ids.len(), "Resolving channel members");
    let resolved = state.members.resolve_members(member_ids).await?;
    Ok(Json(resolved))
}

pub fn channel_routes() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/runs", post(start_channel_run))
        .route("/channels/:id/members", get(channel_members))
}
