//! Dashboard snapshots
//!
//! Holds the latest entity table of each dashboard so a UI that connects
//! mid-run can render the current state before following the event stream.
//! Snapshots only change through [`EventObserver`], and only for the run whose
//! epoch currently owns the dashboard.

use chantrack_common::events::{EventBus, TrackerEvent};
use chantrack_common::models::{
    sort_entities, Dashboard, Entity, ProgressState, RunId, RunSummary, SortDirection, SortKey,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::scheduler::{RunHandle, RunObserver};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub dashboard: Dashboard,
    pub run_id: Option<RunId>,
    pub epoch: u64,
    pub progress: ProgressState,
    pub complete: bool,
    pub entities: Vec<Entity>,
}

impl DashboardSnapshot {
    fn empty(dashboard: Dashboard) -> Self {
        Self {
            dashboard,
            run_id: None,
            epoch: 0,
            progress: ProgressState::new(0),
            complete: false,
            entities: Vec::new(),
        }
    }

    fn owned_by(&self, run: &RunHandle) -> bool {
        self.run_id == Some(run.run_id) && self.epoch == run.epoch
    }
}

pub struct DashboardStore {
    channels: RwLock<DashboardSnapshot>,
    teams: RwLock<DashboardSnapshot>,
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardStore {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(DashboardSnapshot::empty(Dashboard::Channels)),
            teams: RwLock::new(DashboardSnapshot::empty(Dashboard::Teams)),
        }
    }

    fn slot(&self, dashboard: Dashboard) -> &RwLock<DashboardSnapshot> {
        match dashboard {
            Dashboard::Channels => &self.channels,
            Dashboard::Teams => &self.teams,
        }
    }

    fn read(&self, dashboard: Dashboard) -> RwLockReadGuard<'_, DashboardSnapshot> {
        self.slot(dashboard).read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, dashboard: Dashboard) -> RwLockWriteGuard<'_, DashboardSnapshot> {
        self.slot(dashboard).write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self, dashboard: Dashboard) -> DashboardSnapshot {
        self.read(dashboard).clone()
    }

    /// Snapshot with entities stably sorted by `key`
    pub fn sorted(&self, dashboard: Dashboard, key: SortKey, direction: SortDirection) -> DashboardSnapshot {
        let mut snapshot = self.snapshot(dashboard);
        sort_entities(&mut snapshot.entities, key, direction);
        snapshot
    }

    /// Hand the dashboard to a new run; older runs cannot take it back
    pub fn begin(&self, dashboard: Dashboard, run: &RunHandle, entities: Vec<Entity>) -> bool {
        let mut slot = self.write(dashboard);
        if run.epoch < slot.epoch {
            return false;
        }
        slot.run_id = Some(run.run_id);
        slot.epoch = run.epoch;
        slot.progress = ProgressState::new(entities.len());
        slot.complete = false;
        slot.entities = entities;
        true
    }

    pub fn update_entity(&self, dashboard: Dashboard, run: &RunHandle, entity: &Entity) -> bool {
        let mut slot = self.write(dashboard);
        if !slot.owned_by(run) {
            return false;
        }
        match slot.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => {
                *existing = entity.clone();
                true
            }
            None => false,
        }
    }

    pub fn update_progress(&self, dashboard: Dashboard, run: &RunHandle, progress: ProgressState) {
        let mut slot = self.write(dashboard);
        if slot.owned_by(run) && progress.loaded >= slot.progress.loaded {
            slot.progress = progress;
        }
    }

    pub fn complete(&self, dashboard: Dashboard, run: &RunHandle, summary: &RunSummary) {
        let mut slot = self.write(dashboard);
        if slot.owned_by(run) {
            slot.progress = summary.progress;
            slot.complete = true;
        }
    }
}

/// Publishes run notifications on the event bus and mirrors them into the store
pub struct EventObserver {
    dashboard: Dashboard,
    event_bus: EventBus,
    store: Arc<DashboardStore>,
}

impl EventObserver {
    pub fn new(dashboard: Dashboard, event_bus: EventBus, store: Arc<DashboardStore>) -> Self {
        Self {
            dashboard,
            event_bus,
            store,
        }
    }
}

impl RunObserver for EventObserver {
    fn on_progress(&self, run: &RunHandle, progress: ProgressState) {
        self.store.update_progress(self.dashboard, run, progress);
        self.event_bus.emit_lossy(TrackerEvent::RunProgress {
            run_id: run.run_id,
            dashboard: self.dashboard,
            progress,
        });
    }

    fn on_entity_updated(&self, run: &RunHandle, entity: &Entity) {
        if !self.store.update_entity(self.dashboard, run, entity) {
            debug!(run_id = %run.run_id, entity_id = %entity.id, "Snapshot not updated for entity");
        }
        self.event_bus.emit_lossy(TrackerEvent::EntityUpdated {
            run_id: run.run_id,
            dashboard: self.dashboard,
            entity: entity.clone(),
        });
    }

    fn on_run_complete(&self, run: &RunHandle, summary: &RunSummary) {
        self.store.complete(self.dashboard, run, summary);
        self.event_bus.emit_lossy(TrackerEvent::RunCompleted {
            dashboard: self.dashboard,
            summary: *summary,
            timestamp: Utc::now(),
        });
    }

    fn on_run_superseded(&self, run: &RunHandle, _progress: ProgressState) {
        self.event_bus.emit_lossy(TrackerEvent::RunSuperseded {
            run_id: run.run_id,
            dashboard: self.dashboard,
            epoch: run.epoch,
        });
    }
}
