//! Server-Sent Events (SSE) utilities

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::{EventBus, TrackerEvent};
use crate::models::Dashboard;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a tracker event into an SSE frame
pub fn to_sse_event(event: &TrackerEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream tracker events to one SSE client
///
/// `dashboard` restricts the stream to one dashboard's events; `None` forwards
/// everything. A lagging client skips the events it missed and keeps going.
pub fn create_event_sse_stream(
    event_bus: &EventBus,
    dashboard: Option<Dashboard>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(dashboard = ?dashboard, "New SSE client connected");

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if dashboard.is_some_and(|d| d != event.dashboard()) {
                        continue;
                    }
                    if let Some(frame) = to_sse_event(&event) {
                        debug!("SSE: Broadcasting event: {}", event.event_type());
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
