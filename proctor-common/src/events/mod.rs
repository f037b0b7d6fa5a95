//! Room message types and the process-wide EventBus
//!
//! Every message delivered to a session room is a [`ProctorEvent`]. The
//! same messages are mirrored onto an [`EventBus`] so process-level
//! observers (audit logging, monitoring) can follow all rooms at once.

mod detection_types;
mod session_types;

pub use detection_types::{BoundingBox, DetectionDetails, DetectionKind, Severity};
pub use session_types::{AccessDenialReason, ParticipantInfo, Principal, Role, SessionStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Messages fanned out to the connections joined to a session room
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProctorEvent {
    /// Sent only to a connection right after it joins
    SessionSnapshot {
        session_id: Uuid,
        status: SessionStatus,
        integrity_score: f64,
        participants: Vec<ParticipantInfo>,
        timestamp: DateTime<Utc>,
    },

    /// Every accepted detection, delivered to the whole room
    DetectionAlert {
        event_id: Uuid,
        session_id: Uuid,
        kind: DetectionKind,
        severity: Severity,
        confidence: f64,
        /// Points removed from the integrity score by this event
        deduction: f64,
        /// Integrity score after the deduction was applied
        resulting_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// Priority notification for high and critical detections
    CriticalAlert {
        session_id: Uuid,
        kind: DetectionKind,
        severity: Severity,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A connection joined the room (not sent to the joiner)
    ParticipantJoined {
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// A connection left or disconnected (not sent to the leaver)
    ParticipantLeft {
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// Session status changed (start, end, cancel)
    LifecycleChanged {
        session_id: Uuid,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },
}

impl ProctorEvent {
    /// Get event type as string for SSE `event:` field and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ProctorEvent::SessionSnapshot { .. } => "SessionSnapshot",
            ProctorEvent::DetectionAlert { .. } => "DetectionAlert",
            ProctorEvent::CriticalAlert { .. } => "CriticalAlert",
            ProctorEvent::ParticipantJoined { .. } => "ParticipantJoined",
            ProctorEvent::ParticipantLeft { .. } => "ParticipantLeft",
            ProctorEvent::LifecycleChanged { .. } => "LifecycleChanged",
        }
    }

    /// Session room this message belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            ProctorEvent::SessionSnapshot { session_id, .. }
            | ProctorEvent::DetectionAlert { session_id, .. }
            | ProctorEvent::CriticalAlert { session_id, .. }
            | ProctorEvent::ParticipantJoined { session_id, .. }
            | ProctorEvent::ParticipantLeft { session_id, .. }
            | ProctorEvent::LifecycleChanged { session_id, .. } => *session_id,
        }
    }

    /// Priority messages are never the ones shed first under load
    pub fn is_priority(&self) -> bool {
        matches!(
            self,
            ProctorEvent::CriticalAlert { .. } | ProctorEvent::LifecycleChanged { .. }
        )
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Process-wide distribution bus for room messages
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// It is owned by the composition root and injected; there is no global
/// instance.
///
/// # Examples
///
/// ```
/// use proctor_common::events::{EventBus, ProctorEvent, SessionStatus};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(1000));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ProctorEvent::LifecycleChanged {
///     session_id: uuid::Uuid::new_v4(),
///     status: SessionStatus::InProgress,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "LifecycleChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProctorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start dropping the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ProctorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ProctorEvent,
    ) -> Result<usize, broadcast::error::SendError<ProctorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ProctorEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
