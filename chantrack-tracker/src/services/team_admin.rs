//! Team administration
//!
//! Membership changes and team creation. Removal is gated on a bot
//! verification token which is passed through to the backend unchanged; the
//! backend decides whether it is valid.

use chantrack_common::events::{EventBus, TrackerEvent};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::identity::{IdentityError, OperatorIdentityProvider};
use crate::client::{BackendApi, FetchError};

pub const DEFAULT_MEMBER_ROLE: &str = "member";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Verification token required")]
    VerificationRequired,

    #[error("Verification failed (HTTP {status})")]
    VerificationFailed { status: u16 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl From<FetchError> for AdminError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status { status, .. } if status == 401 || status == 403 => {
                AdminError::VerificationFailed { status }
            }
            FetchError::Status { status, body } => AdminError::Rejected { status, message: body },
            FetchError::RateLimited { attempts } => AdminError::Rejected {
                status: 429,
                message: format!("still rate limited after {} attempts", attempts),
            },
            FetchError::Transport(e) => AdminError::Unreachable(e.to_string()),
            FetchError::Decode(msg) => AdminError::Unreachable(msg),
        }
    }
}

pub struct TeamAdmin {
    backend: Arc<BackendApi>,
    identity: Arc<OperatorIdentityProvider>,
    event_bus: EventBus,
}

impl TeamAdmin {
    pub fn new(backend: Arc<BackendApi>, identity: Arc<OperatorIdentityProvider>, event_bus: EventBus) -> Self {
        Self {
            backend,
            identity,
            event_bus,
        }
    }

    pub async fn add_member(
        &self,
        team_id: &str,
        email: &str,
        role: Option<&str>,
        verification_token: Option<&str>,
    ) -> Result<(), AdminError> {
        let email = validate_email(email)?;
        let role = role.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_MEMBER_ROLE);

        self.backend
            .add_team_member(team_id, &email, role, verification_token)
            .await
            .map_err(|e| log_failure("add member", team_id, e))?;

        info!(team_id, email = %email, role, "Team member added");
        self.event_bus.emit_lossy(TrackerEvent::TeamMembershipChanged {
            team_id: team_id.to_string(),
            email,
            added: true,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Remove a member; no request is sent without a verification token
    pub async fn remove_member(
        &self,
        team_id: &str,
        email: &str,
        verification_token: Option<&str>,
    ) -> Result<(), AdminError> {
        let token = verification_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AdminError::VerificationRequired)?;
        let email = validate_email(email)?;

        self.backend
            .remove_team_member(team_id, &email, token)
            .await
            .map_err(|e| log_failure("remove member", team_id, e))?;

        info!(team_id, email = %email, "Team member removed");
        self.event_bus.emit_lossy(TrackerEvent::TeamMembershipChanged {
            team_id: team_id.to_string(),
            email,
            added: false,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Create a team owned by the current operator
    pub async fn create_team(
        &self,
        display_name: &str,
        description: Option<&str>,
        verification_token: Option<&str>,
    ) -> Result<Option<String>, AdminError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AdminError::InvalidInput("team name must not be empty".to_string()));
        }

        let owner = self.identity.current().await?;
        let team_id = self
            .backend
            .create_team(
                display_name,
                description.unwrap_or_default().trim(),
                &owner.email,
                verification_token,
            )
            .await
            .map_err(|e| log_failure("create team", display_name, e))?;

        info!(display_name, team_id = ?team_id, owner = %owner.email, "Team created");
        if let Some(id) = &team_id {
            self.event_bus.emit_lossy(TrackerEvent::TeamCreated {
                team_id: id.clone(),
                display_name: display_name.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(team_id)
    }
}

fn validate_email(email: &str) -> Result<String, AdminError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(AdminError::InvalidInput(format!("'{}' is not an email address", email))),
    }
}

fn log_failure(action: &str, target: &str, err: FetchError) -> AdminError {
    let err = AdminError::from(err);
    warn!(action, target, error = %err, "Team administration failed");
    err
}
