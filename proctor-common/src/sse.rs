//! Server-Sent Events (SSE) utilities
//!
//! Turns a per-connection outbox into an SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::ProctorEvent;

/// Heartbeat interval for idle SSE connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Stream every message from `rx` as an SSE event named after its type
///
/// `guard` lives as long as the stream. Axum drops the stream when the
/// client disconnects, so a guard whose `Drop` leaves the room turns a
/// transport disconnect into a room leave.
pub fn outbox_sse_stream<G>(
    mut rx: mpsc::Receiver<ProctorEvent>,
    guard: G,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    G: Send + 'static,
{
    let stream = async_stream::stream! {
        let _guard = guard;

        while let Some(event) = rx.recv().await {
            match Event::default().event(event.event_type()).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!("Failed to serialize {} for SSE: {}", event.event_type(), e),
            }
        }

        debug!("SSE: outbox closed, ending stream");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
