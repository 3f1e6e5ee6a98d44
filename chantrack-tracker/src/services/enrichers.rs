//! Per-entity enrichment sources
//!
//! Each [`Enricher`] fills one [`FieldCategory`] of an entity from one backend
//! call. `None` means the data could not be fetched; the scheduler turns it into
//! the unavailable sentinel.

use async_trait::async_trait;
use chantrack_common::models::{FieldCategory, FieldUpdate, MemberStats};
use std::sync::Arc;

use crate::client::BackendApi;

#[async_trait]
pub trait Enricher: Send + Sync {
    fn category(&self) -> FieldCategory;

    async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate>;
}

/// Message count and last activity of a Slack channel
pub struct ChannelMessageStats {
    backend: Arc<BackendApi>,
}

#[async_trait]
impl Enricher for ChannelMessageStats {
    fn category(&self) -> FieldCategory {
        FieldCategory::Messages
    }

    async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate> {
        self.backend
            .channel_message_stats(entity_id)
            .await
            .map(FieldUpdate::Messages)
    }
}

/// Member count of a Slack channel (length of its member id list)
pub struct ChannelMemberCount {
    backend: Arc<BackendApi>,
}

#[async_trait]
impl Enricher for ChannelMemberCount {
    fn category(&self) -> FieldCategory {
        FieldCategory::Members
    }

    async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate> {
        let ids = self.backend.channel_member_ids(entity_id).await?;
        Some(FieldUpdate::Members(MemberStats {
            member_count: ids.len() as u64,
        }))
    }
}

/// Message, recent-message and question counts of a team
pub struct TeamMessageStats {
    backend: Arc<BackendApi>,
}

#[async_trait]
impl Enricher for TeamMessageStats {
    fn category(&self) -> FieldCategory {
        FieldCategory::Messages
    }

    async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate> {
        self.backend
            .team_message_stats(entity_id)
            .await
            .map(FieldUpdate::Messages)
    }
}

pub struct TeamMemberCount {
    backend: Arc<BackendApi>,
}

#[async_trait]
impl Enricher for TeamMemberCount {
    fn category(&self) -> FieldCategory {
        FieldCategory::Members
    }

    async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate> {
        let members = self.backend.team_members(entity_id).await?;
        Some(FieldUpdate::Members(MemberStats {
            member_count: members.len() as u64,
        }))
    }
}

/// Enrichers requested for every channel row
pub fn channel_enrichers(backend: &Arc<BackendApi>) -> Vec<Arc<dyn Enricher>> {
    vec![
        Arc::new(ChannelMessageStats {
            backend: Arc::clone(backend),
        }),
        Arc::new(ChannelMemberCount {
            backend: Arc::clone(backend),
        }),
    ]
}

/// Enrichers requested for every team row
pub fn team_enrichers(backend: &Arc<BackendApi>) -> Vec<Arc<dyn Enricher>> {
    vec![
        Arc::new(TeamMessageStats {
            backend: Arc::clone(backend),
        }),
        Arc::new(TeamMemberCount {
            backend: Arc::clone(backend),
        }),
    ]
}
