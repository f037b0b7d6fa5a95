//! Audit trail of room traffic
//!
//! Follows the process-wide [`EventBus`] and logs every message fanned out
//! to any room. Critical alerts are logged at `warn` so they surface with
//! the default filter.

use proctor_common::events::{EventBus, ProctorEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Start the audit task; it stops when the bus is dropped
pub fn spawn_audit_logger(bus: &EventBus) -> JoinHandle<()> {
    let rx = bus.subscribe();
    tokio::spawn(run_audit_logger(rx))
}

pub async fn run_audit_logger(mut rx: broadcast::Receiver<ProctorEvent>) {
    debug!("Audit logger started");

    loop {
        match rx.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Audit logger lagged, {} messages not logged", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    debug!("Audit logger stopped");
}

fn log_event(event: &ProctorEvent) {
    match event {
        ProctorEvent::CriticalAlert {
            session_id,
            kind,
            severity,
            message,
            ..
        } => {
            warn!(%session_id, %kind, %severity, "Critical alert: {}", message);
        }
        ProctorEvent::DetectionAlert {
            session_id,
            kind,
            severity,
            resulting_score,
            ..
        } => {
            debug!(%session_id, %kind, %severity, score = resulting_score, "Detection alert");
        }
        other => {
            debug!(session_id = %other.session_id(), event_type = other.event_type(), "Room message");
        }
    }
}
