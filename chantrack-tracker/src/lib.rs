//! chantrack-tracker library interface
//!
//! Exposes the application state and router for the binary and for
//! integration testing.

pub mod api;
pub mod client;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult, StartupError};

use axum::Router;
use chantrack_common::config::TomlConfig;
use chantrack_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::client::{BackendApi, FetchClient, ReqwestTransport, RetryPolicy, Sleeper, TokioSleeper, Transport};
use crate::services::{DashboardStore, MemberResolver, OperatorIdentityProvider, RunCoordinator, TeamAdmin};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TomlConfig>,
    pub backend: Arc<BackendApi>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Latest table of each dashboard
    pub dashboards: Arc<DashboardStore>,
    pub runs: Arc<RunCoordinator>,
    /// Sequential member lookup worker
    pub members: MemberResolver,
    pub identity: Arc<OperatorIdentityProvider>,
    pub admin: Arc<TeamAdmin>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last upstream error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Build the production state (reqwest transport, tokio timers)
    ///
    /// Must be called inside a tokio runtime: the member resolver worker is
    /// spawned here.
    pub fn new(config: TomlConfig, event_bus: EventBus) -> Result<Self, StartupError> {
        let transport = Arc::new(ReqwestTransport::from_config(&config.backend)?);
        Self::with_parts(config, event_bus, transport, Arc::new(TokioSleeper))
    }

    /// Build the state over explicit transport and clock seams
    pub fn with_parts(
        config: TomlConfig,
        event_bus: EventBus,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, StartupError> {
        let fetch = FetchClient::new(
            transport,
            Arc::clone(&sleeper),
            RetryPolicy::from_config(&config.retry),
        );
        let backend = Arc::new(BackendApi::new(
            Arc::new(fetch),
            config.backend.effective_base_url(),
        )?);

        let dashboards = Arc::new(DashboardStore::new());
        let runs = Arc::new(RunCoordinator::new(
            &config,
            Arc::clone(&backend),
            event_bus.clone(),
            Arc::clone(&dashboards),
            sleeper,
        ));
        let members = MemberResolver::spawn(
            backend.clone(),
            config.members.internal_domain.clone(),
            config.members.lookups_per_second,
        );
        let identity = Arc::new(OperatorIdentityProvider::new(backend.clone()));
        let admin = Arc::new(TeamAdmin::new(
            Arc::clone(&backend),
            Arc::clone(&identity),
            event_bus.clone(),
        ));

        info!(
            backend = config.backend.effective_base_url(),
            channels_policy = ?config.channels.policy,
            teams_policy = ?config.teams.policy,
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            backend,
            event_bus,
            dashboards,
            runs,
            members,
            identity,
            admin,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/events", get(api::event_stream))
        .merge(api::channel_routes())
        .merge(api::team_routes())
        .merge(api::operator_routes())
        .merge(api::health_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
