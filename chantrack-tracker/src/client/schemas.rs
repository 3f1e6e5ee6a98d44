//! Backend response schemas
//!
//! Every field the service consumes is declared here with a default, so a
//! missing or malformed field becomes `None` at the boundary instead of a
//! decode failure. Numbers and timestamps accept the shapes the backend is
//! known to emit (numbers, numeric strings, Slack `seconds.micros`, RFC 3339).

use chantrack_common::models::{Entity, EntityKind, MessageStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// List endpoints return either a bare array or an object wrapping one
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Bare(Vec<T>),
    Wrapped(ListingEnvelope<T>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingEnvelope<T> {
    #[serde(alias = "channels", alias = "teams", alias = "value", alias = "members")]
    items: Vec<T>,
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Wrapped(envelope) => envelope.items,
        }
    }
}

/// Free text given either as a string or as Slack's `{ "value": ... }` object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Plain(String),
    Wrapped { value: String },
}

impl TextField {
    pub fn text(&self) -> &str {
        match self {
            TextField::Plain(text) => text,
            TextField::Wrapped { value } => value,
        }
    }
}

/// `GET /slack/channels` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<TextField>,
    #[serde(default)]
    pub purpose: Option<TextField>,
    #[serde(default)]
    pub topic: Option<TextField>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl ChannelSummary {
    /// Convert to a pending entity; entries without an id are rejected
    pub fn into_entity(self) -> Option<Entity> {
        if self.id.trim().is_empty() {
            return None;
        }
        let description = [&self.description, &self.purpose, &self.topic]
            .into_iter()
            .flatten()
            .map(|t| t.text().trim())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string();
        let name = if self.name.is_empty() { self.id.clone() } else { self.name };

        Some(
            Entity::new(EntityKind::Channel, self.id, name)
                .with_description(description)
                .with_created(self.created),
        )
    }
}

/// `GET /slack/messageStats` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessageStatsResponse {
    #[serde(rename = "messageCount", default, deserialize_with = "flexible_count")]
    pub message_count: Option<u64>,
    #[serde(rename = "lastMessageTimestamp", default, deserialize_with = "flexible_timestamp")]
    pub last_message_timestamp: Option<DateTime<Utc>>,
}

impl ChannelMessageStatsResponse {
    /// A response without a message count carries no usable statistics
    pub fn into_stats(self) -> Option<MessageStats> {
        Some(MessageStats {
            message_count: self.message_count?,
            recent_count: None,
            question_count: None,
            last_message: self.last_message_timestamp,
        })
    }
}

/// `GET /slack/members` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMembersResponse {
    #[serde(default)]
    pub members: Option<Vec<String>>,
}

/// `GET /slack/user/info` response
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    #[serde(default)]
    pub user: Option<SlackUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: SlackProfile,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_app_user: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl SlackUser {
    /// First non-empty of real name, profile names, handle; else `fallback`
    pub fn display_name(&self, fallback: &str) -> String {
        [
            &self.real_name,
            &self.profile.real_name,
            &self.profile.display_name,
            &self.name,
        ]
        .into_iter()
        .flatten()
        .map(|n| n.trim())
        .find(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
    }

    pub fn email(&self) -> Option<String> {
        self.profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }

    pub fn is_automation(&self) -> bool {
        self.is_bot || self.is_app_user
    }
}

/// `GET /teams` entry
#[derive(Debug, Clone, Deserialize)]
pub struct TeamSummary {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "displayName", alias = "display_name", alias = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        rename = "createdDateTime",
        alias = "created",
        default,
        deserialize_with = "flexible_timestamp"
    )]
    pub created: Option<DateTime<Utc>>,
}

impl TeamSummary {
    pub fn into_entity(self) -> Option<Entity> {
        if self.id.trim().is_empty() {
            return None;
        }
        let name = if self.display_name.is_empty() { self.id.clone() } else { self.display_name };

        Some(
            Entity::new(EntityKind::Team, self.id, name)
                .with_description(self.description.unwrap_or_default())
                .with_created(self.created),
        )
    }
}

/// `GET /teams/{id}/members` entry
#[derive(Debug, Clone, Deserialize)]
pub struct TeamMember {
    #[serde(default, alias = "userId")]
    pub id: Option<String>,
    #[serde(rename = "displayName", alias = "display_name", alias = "name", default)]
    pub display_name: Option<String>,
    #[serde(default, alias = "mail")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, alias = "isBot")]
    pub is_bot: bool,
}

/// `POST /teams/messages` response
#[derive(Debug, Clone, Deserialize)]
pub struct TeamMessageStatsResponse {
    #[serde(rename = "messageCount", default, deserialize_with = "flexible_count")]
    pub message_count: Option<u64>,
    #[serde(rename = "recentCount", default, deserialize_with = "flexible_count")]
    pub recent_count: Option<u64>,
    #[serde(rename = "questionCount", default, deserialize_with = "flexible_count")]
    pub question_count: Option<u64>,
    #[serde(rename = "latestMessage", default, deserialize_with = "flexible_timestamp")]
    pub latest_message: Option<DateTime<Utc>>,
}

impl TeamMessageStatsResponse {
    pub fn into_stats(self) -> Option<MessageStats> {
        Some(MessageStats {
            message_count: self.message_count?,
            recent_count: self.recent_count,
            question_count: self.question_count,
            last_message: self.latest_message,
        })
    }
}

/// `POST /teams` response
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeamResponse {
    #[serde(default, alias = "teamId")]
    pub id: Option<String>,
}

/// Current operator identity (`GET /user/profile`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

fn flexible_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_count))
}

fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

/// Non-negative integer given as a number or a numeric string
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Timestamp given as epoch seconds/milliseconds (number or string) or RFC 3339
///
/// Objects are searched for a `createdDateTime` or `timestamp` member, which is
/// how the teams backend reports its latest message.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        Value::Object(map) => map
            .get("createdDateTime")
            .or_else(|| map.get("timestamp"))
            .and_then(parse_timestamp),
        _ => None,
    }
}

// Values at or above 1e12 are milliseconds (1e12 s is ~33,000 years out).
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let millis = if raw >= 1e12 { raw } else { raw * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}
