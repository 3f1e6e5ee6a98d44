//! Team dashboard and administration handlers
//!
//! POST /teams/runs, GET /teams, POST /teams,
//! GET/POST/DELETE /teams/:id/members

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chantrack_common::models::{Dashboard, ResolvedMembers};
use serde::{Deserialize, Serialize};

use super::{record_error, DashboardResponse, SortQuery};
use crate::client::VERIFICATION_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::services::{classify_team_members, RunTicket};
use crate::AppState;

/// POST /teams/:id/members request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// DELETE /teams/:id/members request
#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub email: String,
}

/// POST /teams request
#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub team_id: String,
    pub email: String,
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateTeamResponse {
    pub team_id: Option<String>,
    pub display_name: String,
}

fn verification_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(VERIFICATION_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// POST /teams/runs
pub async fn start_team_run(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<RunTicket>)> {
    match state.runs.start_team_run().await {
        Ok(ticket) => Ok((StatusCode::ACCEPTED, Json(ticket))),
        Err(e) => {
            let err = ApiError::from(e);
            record_error(&state, &err).await;
            Err(err)
        }
    }
}

/// GET /teams?sort=&direction=
pub async fn list_teams(
    State(state): State<AppState>,
    Query(query): Query<SortQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let (key, direction) = query.parse()?;
    let snapshot = state.dashboards.sorted(Dashboard::Teams, key, direction);
    Ok(Json(snapshot.into()))
}

/// GET /teams/:id/members
pub async fn team_members(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> ApiResult<Json<ResolvedMembers>> {
    let members = state
        .backend
        .team_members(&team_id)
        .await
        .ok_or_else(|| ApiError::Upstream(format!("Members of team {} unavailable", team_id)))?;

    let resolved = classify_team_members(members, &state.config.members.internal_domain);
    Ok(Json(resolved))
}

/// POST /teams/:id/members
pub async fn add_member(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Json<MembershipResponse>> {
    state
        .admin
        .add_member(
            &team_id,
            &request.email,
            request.role.as_deref(),
            verification_token(&headers),
        )
        .await?;

    Ok(Json(MembershipResponse {
        team_id,
        email: request.email.trim().to_string(),
        added: true,
    }))
}

/// DELETE /teams/:id/members
///
/// Requires the `X-Turnstile-Token` header.
pub async fn remove_member(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RemoveMemberRequest>,
) -> ApiResult<Json<MembershipResponse>> {
    state
        .admin
        .remove_member(&team_id, &request.email, verification_token(&headers))
        .await?;

    Ok(Json(MembershipResponse {
        team_id,
        email: request.email.trim().to_string(),
        added: false,
    }))
}

/// POST /teams
pub async fn create_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<CreateTeamResponse>)> {
    let team_id = state
        .admin
        .create_team(
            &request.display_name,
            request.description.as_deref(),
            verification_token(&headers),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTeamResponse {
            team_id,
            display_name: request.display_name.trim().to_string(),
        }),
    ))
}

pub fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/runs", post(start_team_run))
        .route(
            "/teams/:id/members",
            get(team_members).post(add_member).delete(remove_member),
        )
}
