//! Backend API client
//!
//! Typed accessors for the endpoints the dashboards consume. Per-entity reads
//! return `Option` (no data is never fatal); entity listings return
//! [`BackendError`] because a run cannot start without them.

use chantrack_common::models::{Entity, MessageStats};
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::fetch::{FetchClient, FetchError};
use super::schemas::{
    ChannelMembersResponse, ChannelMessageStatsResponse, ChannelSummary, CreateTeamResponse,
    Listing, OperatorProfile, SlackUser, TeamMember, TeamMessageStatsResponse, TeamSummary,
    UserInfoResponse,
};
use super::transport::ApiRequest;

/// Header carrying the bot-verification token on gated mutations
pub const VERIFICATION_HEADER: &str = "X-Turnstile-Token";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid backend URL '{0}': {1}")]
    InvalidBaseUrl(String, String),

    #[error("{0} unavailable from backend")]
    Unavailable(&'static str),
}

/// Optional filters for the channel listing
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub channel_name: Option<String>,
    pub description: Option<String>,
}

pub struct BackendApi {
    fetch: Arc<FetchClient>,
    base: Url,
}

impl BackendApi {
    pub fn new(fetch: Arc<FetchClient>, base_url: &str) -> Result<Self, BackendError> {
        let base = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidBaseUrl(base_url.to_string(), e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidBaseUrl(
                base_url.to_string(),
                "not a hierarchical URL".to_string(),
            ));
        }
        info!(base_url = %base, "Backend API configured");
        Ok(Self { fetch, base })
    }

    /// Build an endpoint URL; path segments are percent-encoded individually
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url.into()
    }

    // ---------------------------------------------------------------------
    // Slack channels
    // ---------------------------------------------------------------------

    pub async fn list_channels(&self, filter: &ChannelFilter) -> Result<Vec<Entity>, BackendError> {
        let url = self.endpoint(
            &["slack", "channels"],
            &[
                ("channelName", filter.channel_name.as_deref().unwrap_or("")),
                ("description", filter.description.as_deref().unwrap_or("")),
            ],
        );

        let listing: Listing<ChannelSummary> = self
            .fetch
            .fetch_json(&ApiRequest::get(url))
            .await
            .ok_or(BackendError::Unavailable("Channel list"))?;

        Ok(into_entities(listing.into_items(), ChannelSummary::into_entity, "channel"))
    }

    pub async fn channel_message_stats(&self, channel_id: &str) -> Option<MessageStats> {
        let url = self.endpoint(&["slack", "messageStats"], &[("channelId", channel_id)]);
        let response: ChannelMessageStatsResponse = self.fetch.fetch_json(&ApiRequest::get(url)).await?;
        response.into_stats()
    }

    pub async fn channel_member_ids(&self, channel_id: &str) -> Option<Vec<String>> {
        let url = self.endpoint(&["slack", "members"], &[("channelId", channel_id)]);
        let response: ChannelMembersResponse = self.fetch.fetch_json(&ApiRequest::get(url)).await?;
        response.members
    }

    pub async fn user_info(&self, user_id: &str) -> Option<SlackUser> {
        let url = self.endpoint(&["slack", "user", "info"], &[("userId", user_id)]);
        let response: UserInfoResponse = self.fetch.fetch_json(&ApiRequest::get(url)).await?;
        response.user
    }

    // ---------------------------------------------------------------------
    // Teams
    // ---------------------------------------------------------------------

    pub async fn list_teams(&self) -> Result<Vec<Entity>, BackendError> {
        let url = self.endpoint(&["teams"], &[]);
        let listing: Listing<TeamSummary> = self
            .fetch
            .fetch_json(&ApiRequest::get(url))
            .await
            .ok_or(BackendError::Unavailable("Team list"))?;

        Ok(into_entities(listing.into_items(), TeamSummary::into_entity, "team"))
    }

    pub async fn team_members(&self, team_id: &str) -> Option<Vec<TeamMember>> {
        let url = self.endpoint(&["teams", team_id, "members"], &[]);
        let listing: Listing<TeamMember> = self.fetch.fetch_json(&ApiRequest::get(url)).await?;
        Some(listing.into_items())
    }

    pub async fn team_message_stats(&self, team_id: &str) -> Option<MessageStats> {
        let url = self.endpoint(&["teams", "messages"], &[]);
        let request = ApiRequest::post(url, json!({ "teamId": team_id }));
        let response: TeamMessageStatsResponse = self.fetch.fetch_json(&request).await?;
        response.into_stats()
    }

    pub async fn add_team_member(
        &self,
        team_id: &str,
        email: &str,
        role: &str,
        verification_token: Option<&str>,
    ) -> Result<(), FetchError> {
        let url = self.endpoint(&["teams", team_id, "members"], &[]);
        let request = with_verification(
            ApiRequest::post(url, json!({ "email": email, "role": role })),
            verification_token,
        );
        self.fetch.execute(&request).await?;
        debug!(team_id, email, "Team member added");
        Ok(())
    }

    pub async fn remove_team_member(
        &self,
        team_id: &str,
        email: &str,
        verification_token: &str,
    ) -> Result<(), FetchError> {
        let url = self.endpoint(&["teams", team_id, "members"], &[]);
        let request = ApiRequest::delete(url, json!({ "email": email }))
            .with_header(VERIFICATION_HEADER, verification_token);
        self.fetch.execute(&request).await?;
        debug!(team_id, email, "Team member removed");
        Ok(())
    }

    /// Create a team; returns the new team id when the backend reports one
    pub async fn create_team(
        &self,
        display_name: &str,
        description: &str,
        owner_email: &str,
        verification_token: Option<&str>,
    ) -> Result<Option<String>, FetchError> {
        let url = self.endpoint(&["teams"], &[]);
        let request = with_verification(
            ApiRequest::post(
                url,
                json!({
                    "displayName": display_name,
                    "description": description,
                    "ownerEmail": owner_email,
                }),
            ),
            verification_token,
        );

        let body = self.fetch.send(&request).await?;
        let team_id = body
            .and_then(|value| serde_json::from_value::<CreateTeamResponse>(value).ok())
            .and_then(|response| response.id);
        if team_id.is_none() {
            warn!(display_name, "Team created but backend returned no id");
        }
        Ok(team_id)
    }

    // ---------------------------------------------------------------------
    // Operator
    // ---------------------------------------------------------------------

    pub async fn operator_profile(&self) -> Option<OperatorProfile> {
        let url = self.endpoint(&["user", "profile"], &[]);
        let profile: OperatorProfile = self.fetch.fetch_json(&ApiRequest::get(url)).await?;
        if profile.email.trim().is_empty() {
            warn!("Operator profile has no email");
            return None;
        }
        Some(profile)
    }
}

fn with_verification(request: ApiRequest, token: Option<&str>) -> ApiRequest {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => request.with_header(VERIFICATION_HEADER, token),
        None => request,
    }
}

fn into_entities<T>(items: Vec<T>, convert: fn(T) -> Option<Entity>, what: &str) -> Vec<Entity> {
    let listed = items.len();
    let entities: Vec<Entity> = items.into_iter().filter_map(convert).collect();
    if entities.len() < listed {
        warn!(
            kind = what,
            dropped = listed - entities.len(),
            "Dropped listing entries without an id"
        );
    }
    info!(kind = what, count = entities.len(), "Entity list fetched");
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fetch::RetryPolicy;
    use crate::client::testing::{json_response, status_response, RecordingSleeper, RouteTransport};
    use crate::client::transport::Method;
    use chantrack_common::models::EntityKind;

    fn backend(transport: Arc<RouteTransport>) -> BackendApi {
        let fetch = FetchClient::new(transport, Arc::new(RecordingSleeper::default()), RetryPolicy::default());
        BackendApi::new(Arc::new(fetch), "http://backend.test/api/").unwrap()
    }

    #[test]
    fn test_invalid_base_url() {
        let fetch = FetchClient::new(
            Arc::new(RouteTransport::sequence(Vec::new())),
            Arc::new(RecordingSleeper::default()),
            RetryPolicy::default(),
        );
        assert!(BackendApi::new(Arc::new(fetch), "not a url").is_err());
    }

    #[tokio::test]
    async fn test_list_channels_builds_query_and_drops_invalid() {
        let transport = Arc::new(RouteTransport::new(|_| {
            Ok(json_response(
                200,
                json!([{"id": "C1", "name": "general"}, {"name": "no-id"}]),
            ))
        }));
        let api = backend(transport.clone());

        let filter = ChannelFilter {
            channel_name: Some("eng ops".to_string()),
            description: None,
        };
        let channels = api.list_channels(&filter).await.unwrap();

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].kind, EntityKind::Channel);
        let url = &transport.requests()[0].url;
        assert_eq!(url, "http://backend.test/api/slack/channels?channelName=eng+ops&description=");
    }

    #[tokio::test]
    async fn test_list_failure_is_an_error() {
        let api = backend(Arc::new(RouteTransport::new(|_| Ok(status_response(500)))));
        assert!(matches!(
            api.list_teams().await,
            Err(BackendError::Unavailable("Team list"))
        ));
    }

    #[tokio::test]
    async fn test_team_ids_are_path_encoded() {
        let transport = Arc::new(RouteTransport::new(|_| Ok(json_response(200, json!({"members": []})))));
        let api = backend(transport.clone());

        let members = api.team_members("19:abc/def").await.unwrap();
        assert!(members.is_empty());
        assert_eq!(transport.requests()[0].url, "http://backend.test/api/teams/19:abc%2Fdef/members");
    }

    #[tokio::test]
    async fn test_team_stats_posts_team_id() {
        let transport = Arc::new(RouteTransport::new(|_| Ok(json_response(200, json!({"messageCount": 7})))));
        let api = backend(transport.clone());

        let stats = api.team_message_stats("T1").await.unwrap();
        assert_eq!(stats.message_count, 7);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, Some(json!({"teamId": "T1"})));
    }

    #[tokio::test]
    async fn test_remove_member_sends_verification_header() {
        let transport = Arc::new(RouteTransport::new(|_| Ok(status_response(204))));
        let api = backend(transport.clone());

        api.remove_team_member("T1", "a@adobe.com", "tok-123").await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Delete);
        assert_eq!(request.header(VERIFICATION_HEADER), Some("tok-123"));
    }

    #[tokio::test]
    async fn test_operator_profile_requires_email() {
        let api = backend(Arc::new(RouteTransport::new(|_| {
            Ok(json_response(200, json!({"name": "Op", "email": " "})))
        })));
        assert!(api.operator_profile().await.is_none());
    }
}
