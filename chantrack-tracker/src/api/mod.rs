//! HTTP API handlers for chantrack-tracker
//!
//! REST endpoints for starting runs, reading dashboard snapshots, member lists
//! and team administration, plus the SSE event stream.

pub mod channels;
pub mod health;
pub mod operator;
pub mod sse;
pub mod teams;

pub use channels::channel_routes;
pub use health::health_routes;
pub use operator::operator_routes;
pub use sse::event_stream;
pub use teams::team_routes;

use chantrack_common::models::{Entity, SortDirection, SortKey};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::DashboardSnapshot;
use crate::AppState;

/// `?sort=&direction=` query of the dashboard tables
#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl SortQuery {
    pub fn parse(&self) -> ApiResult<(SortKey, SortDirection)> {
        let key = match self.sort.as_deref() {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => SortKey::default(),
        };
        let direction = match self.direction.as_deref() {
            Some(d) if !d.is_empty() => d.parse()?,
            _ => SortDirection::default(),
        };
        Ok((key, direction))
    }
}

/// Rendered table cells of one entity
#[derive(Debug, Serialize)]
pub struct TableRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created: Option<String>,
    pub message_count: String,
    pub last_message: String,
    pub member_count: String,
}

impl From<&Entity> for TableRow {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            description: entity.description.clone(),
            created: entity.created.map(|ts| ts.format("%Y-%m-%d").to_string()),
            message_count: entity.message_count_cell(),
            last_message: entity.last_message_cell(),
            member_count: entity.member_count_cell(),
        }
    }
}

/// GET /channels and GET /teams response
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
    pub percent: u8,
    pub rows: Vec<TableRow>,
}

impl From<DashboardSnapshot> for DashboardResponse {
    fn from(snapshot: DashboardSnapshot) -> Self {
        let rows = snapshot.entities.iter().map(TableRow::from).collect();
        Self {
            percent: snapshot.progress.percent(),
            snapshot,
            rows,
        }
    }
}

/// Remember an upstream failure for the health endpoint
pub(crate) async fn record_error(state: &AppState, err: &ApiError) {
    *state.last_error.write().await = Some(err.to_string());
}
