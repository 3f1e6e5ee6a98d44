//! Event definitions and EventBus
//!
//! Provides the tracker event enum and the broadcast bus used to fan progress
//! out to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{Dashboard, Entity, ProgressState, RunId, RunSummary};

/// Tracker event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// Enrichment run started for a dashboard
    ///
    /// Triggers:
    /// - SSE: Reset the progress indicator and render pending rows
    RunStarted {
        run_id: RunId,
        dashboard: Dashboard,
        epoch: u64,
        /// Entities listed at run start, all fields pending
        entities: Vec<Entity>,
        timestamp: DateTime<Utc>,
    },

    /// One unit of work (entity or chunk) finished
    RunProgress {
        run_id: RunId,
        dashboard: Dashboard,
        progress: ProgressState,
    },

    /// An entity received enrichment results (values or sentinels)
    EntityUpdated {
        run_id: RunId,
        dashboard: Dashboard,
        entity: Entity,
    },

    /// Every entity of the run is settled
    RunCompleted {
        dashboard: Dashboard,
        summary: RunSummary,
        timestamp: DateTime<Utc>,
    },

    /// A newer run on the same dashboard replaced this one
    RunSuperseded {
        run_id: RunId,
        dashboard: Dashboard,
        epoch: u64,
    },

    /// The run could not start (entity list unavailable)
    ///
    /// Triggers:
    /// - SSE: Replace the table with a dismissable error and retry affordance
    RunFailed {
        dashboard: Dashboard,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Team membership changed through an admin action
    TeamMembershipChanged {
        team_id: String,
        email: String,
        added: bool,
        timestamp: DateTime<Utc>,
    },

    /// A team was created through an admin action
    TeamCreated {
        team_id: String,
        display_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl TrackerEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            TrackerEvent::RunStarted { .. } => "RunStarted",
            TrackerEvent::RunProgress { .. } => "RunProgress",
            TrackerEvent::EntityUpdated { .. } => "EntityUpdated",
            TrackerEvent::RunCompleted { .. } => "RunCompleted",
            TrackerEvent::RunSuperseded { .. } => "RunSuperseded",
            TrackerEvent::RunFailed { .. } => "RunFailed",
            TrackerEvent::TeamMembershipChanged { .. } => "TeamMembershipChanged",
            TrackerEvent::TeamCreated { .. } => "TeamCreated",
        }
    }

    /// Dashboard the event belongs to, used for SSE filtering
    pub fn dashboard(&self) -> Dashboard {
        match self {
            TrackerEvent::RunStarted { dashboard, .. }
            | TrackerEvent::RunProgress { dashboard, .. }
            | TrackerEvent::EntityUpdated { dashboard, .. }
            | TrackerEvent::RunCompleted { dashboard, .. }
            | TrackerEvent::RunSuperseded { dashboard, .. }
            | TrackerEvent::RunFailed { dashboard, .. } => *dashboard,
            TrackerEvent::TeamMembershipChanged { .. } | TrackerEvent::TeamCreated { .. } => {
                Dashboard::Teams
            }
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use chantrack_common::events::{EventBus, TrackerEvent};
/// use chantrack_common::models::Dashboard;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TrackerEvent::RunFailed {
///     dashboard: Dashboard::Channels,
///     message: "channel list unavailable".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TrackerEvent::RunProgress {
            run_id: RunId::new(),
            dashboard: Dashboard::Teams,
            progress: ProgressState { loaded: 3, total: 7 },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RunProgress");
        assert_eq!(json["dashboard"], "teams");
        assert_eq!(json["progress"]["loaded"], 3);
        assert_eq!(event.event_type(), "RunProgress");
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let entity = Entity::new(EntityKind::Channel, "C1", "general");
        bus.emit_lossy(TrackerEvent::EntityUpdated {
            run_id: RunId::new(),
            dashboard: Dashboard::Channels,
            entity,
        });

        match rx.recv().await.unwrap() {
            TrackerEvent::EntityUpdated { entity, .. } => assert_eq!(entity.id, "C1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.emit_lossy(TrackerEvent::RunFailed {
            dashboard: Dashboard::Channels,
            message: "x".into(),
            timestamp: Utc::now(),
        });

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }
}
