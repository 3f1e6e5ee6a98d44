//! Channel and team entities with independently enriched field groups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Rendered in place of a field that could not be fetched
pub const UNAVAILABLE_SENTINEL: &str = "-";

/// Rendered in place of a field whose fetch has not finished yet
pub const PENDING_PLACEHOLDER: &str = "...";

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Slack channel
    Channel,
    /// Teams team
    Team,
}

/// Admin dashboard. Each dashboard tracks exactly one entity kind and owns
/// its own enrichment run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dashboard {
    Channels,
    Teams,
}

impl Dashboard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dashboard::Channels => "channels",
            Dashboard::Teams => "teams",
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dashboard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channels" | "channel" | "slack" => Ok(Dashboard::Channels),
            "teams" | "team" => Ok(Dashboard::Teams),
            other => Err(Error::InvalidInput(format!("Unknown dashboard: {}", other))),
        }
    }
}

/// Lifecycle of one enrichable field group
///
/// `Pending` means "not yet attempted"; `Unavailable` is the failure sentinel
/// recorded once a fetch was attempted and produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FieldState<T> {
    #[default]
    Pending,
    Loaded(T),
    Unavailable,
}

impl<T> FieldState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, FieldState::Pending)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FieldState::Unavailable)
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            FieldState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    /// Render for a table cell
    pub fn display_with(&self, render: impl FnOnce(&T) -> String) -> String {
        match self {
            FieldState::Pending => PENDING_PLACEHOLDER.to_string(),
            FieldState::Loaded(value) => render(value),
            FieldState::Unavailable => UNAVAILABLE_SENTINEL.to_string(),
        }
    }
}

/// Message statistics for a channel or team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    /// Total messages in the conversation
    pub message_count: u64,
    /// Messages within the backend's "recent" window (teams only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_count: Option<u64>,
    /// Messages classified as questions (teams only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u64>,
    /// Timestamp of the most recent message
    pub last_message: Option<DateTime<Utc>>,
}

/// Member statistics for a channel or team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    pub member_count: u64,
}

/// Enrichable field group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Messages,
    Members,
}

impl FieldCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::Messages => "messages",
            FieldCategory::Members => "members",
        }
    }
}

/// Successful enrichment payload for one field group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Messages(MessageStats),
    Members(MemberStats),
}

impl FieldUpdate {
    pub fn category(&self) -> FieldCategory {
        match self {
            FieldUpdate::Messages(_) => FieldCategory::Messages,
            FieldUpdate::Members(_) => FieldCategory::Members,
        }
    }
}

/// A channel or team row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque backend identifier
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    pub description: String,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: FieldState<MessageStats>,
    #[serde(default)]
    pub members: FieldState<MemberStats>,
}

impl Entity {
    /// Create an entity with all enrichable fields pending
    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            description: String::new(),
            created: None,
            messages: FieldState::Pending,
            members: FieldState::Pending,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self
    }

    /// Store a successful enrichment, replacing the whole field group
    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::Messages(stats) => self.messages = FieldState::Loaded(stats),
            FieldUpdate::Members(stats) => self.members = FieldState::Loaded(stats),
        }
    }

    /// Record the failure sentinel for a field group
    pub fn mark_unavailable(&mut self, category: FieldCategory) {
        match category {
            FieldCategory::Messages => self.messages = FieldState::Unavailable,
            FieldCategory::Members => self.members = FieldState::Unavailable,
        }
    }

    pub fn is_pending(&self, category: FieldCategory) -> bool {
        match category {
            FieldCategory::Messages => self.messages.is_pending(),
            FieldCategory::Members => self.members.is_pending(),
        }
    }

    pub fn is_unavailable(&self, category: FieldCategory) -> bool {
        match category {
            FieldCategory::Messages => self.messages.is_unavailable(),
            FieldCategory::Members => self.members.is_unavailable(),
        }
    }

    /// Message count cell text
    pub fn message_count_cell(&self) -> String {
        self.messages.display_with(|s| s.message_count.to_string())
    }

    /// Member count cell text
    pub fn member_count_cell(&self) -> String {
        self.members.display_with(|s| s.member_count.to_string())
    }

    /// Last message date cell text
    pub fn last_message_cell(&self) -> String {
        self.messages.display_with(|s| {
            s.last_message
                .map(|ts| ts.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| UNAVAILABLE_SENTINEL.to_string())
        })
    }
}
