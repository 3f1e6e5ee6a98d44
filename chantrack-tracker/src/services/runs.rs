//! Run coordination
//!
//! Starts enrichment runs for the dashboards: allocate the run's epoch, fetch
//! the entity list, hand the dashboard snapshot to the run and spawn the
//! scheduler on its own task. A failed listing aborts the run with a
//! `RunFailed` event. A listing that lands after a newer run has started is
//! acknowledged as superseded and never scheduled.

use chantrack_common::config::TomlConfig;
use chantrack_common::events::{EventBus, TrackerEvent};
use chantrack_common::models::{Dashboard, Entity, RunId};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::dashboard::{DashboardStore, EventObserver};
use super::enrichers::{channel_enrichers, team_enrichers, Enricher};
use super::scheduler::{EnrichmentScheduler, RunHandle, SchedulePolicy};
use crate::client::{BackendApi, BackendError, ChannelFilter, Sleeper};

/// Accepted run, returned to the caller before enrichment finishes
#[derive(Debug, Clone, Serialize)]
pub struct RunTicket {
    pub run_id: RunId,
    pub epoch: u64,
    pub dashboard: Dashboard,
    pub total: usize,
    /// A newer run took over the dashboard before this one could start
    pub superseded: bool,
}

struct DashboardRunner {
    scheduler: Arc<EnrichmentScheduler>,
    enrichers: Arc<Vec<Arc<dyn Enricher>>>,
}

pub struct RunCoordinator {
    backend: Arc<BackendApi>,
    event_bus: EventBus,
    store: Arc<DashboardStore>,
    channels: DashboardRunner,
    teams: DashboardRunner,
}

impl RunCoordinator {
    pub fn new(
        config: &TomlConfig,
        backend: Arc<BackendApi>,
        event_bus: EventBus,
        store: Arc<DashboardStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let channels = DashboardRunner {
            scheduler: Arc::new(EnrichmentScheduler::new(
                SchedulePolicy::from_config(&config.channels),
                Arc::clone(&sleeper),
            )),
            enrichers: Arc::new(channel_enrichers(&backend)),
        };
        let teams = DashboardRunner {
            scheduler: Arc::new(EnrichmentScheduler::new(
                SchedulePolicy::from_config(&config.teams),
                sleeper,
            )),
            enrichers: Arc::new(team_enrichers(&backend)),
        };

        Self {
            backend,
            event_bus,
            store,
            channels,
            teams,
        }
    }

    fn runner(&self, dashboard: Dashboard) -> &DashboardRunner {
        match dashboard {
            Dashboard::Channels => &self.channels,
            Dashboard::Teams => &self.teams,
        }
    }

    pub async fn start_channel_run(&self, filter: ChannelFilter) -> Result<RunTicket, BackendError> {
        let handle = self.channels.scheduler.begin_run();
        let listing = self.backend.list_channels(&filter).await;
        self.launch(Dashboard::Channels, handle, listing)
    }

    pub async fn start_team_run(&self) -> Result<RunTicket, BackendError> {
        let handle = self.teams.scheduler.begin_run();
        let listing = self.backend.list_teams().await;
        self.launch(Dashboard::Teams, handle, listing)
    }

    fn launch(
        &self,
        dashboard: Dashboard,
        handle: RunHandle,
        listing: Result<Vec<Entity>, BackendError>,
    ) -> Result<RunTicket, BackendError> {
        let entities = match listing {
            Ok(entities) => entities,
            Err(e) => {
                error!(dashboard = %dashboard, run_id = %handle.run_id, error = %e, "Run could not start");
                self.event_bus.emit_lossy(TrackerEvent::RunFailed {
                    dashboard,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        let runner = self.runner(dashboard);
        let mut ticket = RunTicket {
            run_id: handle.run_id,
            epoch: handle.epoch,
            dashboard,
            total: entities.len(),
            superseded: false,
        };

        if !runner.scheduler.is_current(&handle) || !self.store.begin(dashboard, &handle, entities.clone()) {
            info!(dashboard = %dashboard, run_id = %handle.run_id, epoch = handle.epoch, "Run superseded before it started");
            ticket.superseded = true;
            return Ok(ticket);
        }
        self.event_bus.emit_lossy(TrackerEvent::RunStarted {
            run_id: handle.run_id,
            dashboard,
            epoch: handle.epoch,
            entities: entities.clone(),
            timestamp: Utc::now(),
        });

        let scheduler = Arc::clone(&runner.scheduler);
        let enrichers = Arc::clone(&runner.enrichers);
        let observer = EventObserver::new(dashboard, self.event_bus.clone(), Arc::clone(&self.store));

        info!(dashboard = %dashboard, run_id = %handle.run_id, epoch = handle.epoch, total = ticket.total, "Spawning enrichment run");
        tokio::spawn(async move {
            scheduler.run(handle, entities, &enrichers, &observer).await;
        });

        Ok(ticket)
    }
}
