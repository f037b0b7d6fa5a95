//! Detection ingestion pipeline
//!
//! validate → classify → (under the session guard) admit, deduct, persist,
//! commit → fan out. The durable write happens before the in-memory score
//! is touched, so a store failure or timeout leaves nothing half-applied.

use chrono::{DateTime, Utc};
use proctor_common::events::{DetectionDetails, DetectionKind, ProctorEvent, SessionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connection::ConnectionId;
use crate::error::{Error, Result, ValidationError};
use crate::scoring::{apply_deduction, ScoringPolicy};
use crate::session::{AcceptedEvent, DetectionEvent, SessionRegistry};

/// Raw detection as submitted by a monitored participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionInput {
    pub session_id: Uuid,
    pub kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Payload checks that need no session state
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDetection {
    pub kind: DetectionKind,
    pub confidence: f64,
    pub details: DetectionDetails,
}

impl DetectionInput {
    pub fn validate(&self) -> std::result::Result<ValidatedDetection, ValidationError> {
        let kind = self
            .kind
            .parse::<DetectionKind>()
            .map_err(|_| ValidationError::UnknownKind(self.kind.clone()))?;

        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }

        let details = DetectionDetails::parse(kind, self.details.as_ref())
            .map_err(|e| match e {
                proctor_common::Error::InvalidInput(msg) => ValidationError::MalformedDetails(msg),
                other => ValidationError::MalformedDetails(other.to_string()),
            })?;

        Ok(ValidatedDetection {
            kind,
            confidence: self.confidence,
            details,
        })
    }
}

pub struct DetectionPipeline {
    registry: Arc<SessionRegistry>,
    policy: ScoringPolicy,
}

impl DetectionPipeline {
    pub fn new(registry: Arc<SessionRegistry>, policy: ScoringPolicy) -> Self {
        Self { registry, policy }
    }

    /// Score one detection from `connection_id`
    ///
    /// Exactly one event is recorded and one deduction applied per `Ok`.
    pub async fn ingest(
        &self,
        connection_id: &ConnectionId,
        input: DetectionInput,
    ) -> Result<AcceptedEvent> {
        let session_id = input.session_id;
        let not_in_room = || Error::NotInRoom {
            connection_id: *connection_id,
            session_id,
        };

        match self.registry.membership(connection_id).await {
            Some(membership) if membership.session_id == session_id => {}
            _ => return Err(not_in_room()),
        }

        let detection = input.validate()?;
        let assessment = self.policy.assess(detection.kind, detection.confidence);

        let mut guard = self.registry.lock(session_id).await?;
        // Membership may have changed while waiting for the guard
        if !guard.room.contains(connection_id) {
            return Err(not_in_room());
        }
        if guard.session.status != SessionStatus::InProgress {
            return Err(Error::InvalidState(format!(
                "session {} is {}, detections are only accepted while in_progress",
                session_id, guard.session.status
            )));
        }
        guard
            .session
            .detection_settings
            .admit(detection.kind, detection.confidence)?;

        let current = guard.session.integrity_score;
        let resulting_score = apply_deduction(current, assessment.deduction);
        let now = Utc::now();
        let accepted = AcceptedEvent {
            event: DetectionEvent {
                id: Uuid::new_v4(),
                session_id,
                timestamp: input.timestamp.unwrap_or(now),
                kind: detection.kind,
                confidence: detection.confidence,
                severity: assessment.severity,
                details: detection.details,
            },
            deduction: current - resulting_score,
            resulting_score,
        };

        self.registry
            .persist(self.registry.store().record_detection(&accepted))
            .await?;
        guard.session.integrity_score = resulting_score;

        let event = &accepted.event;
        info!(
            %session_id,
            connection = %connection_id,
            event_id = %event.id,
            kind = %event.kind,
            severity = %event.severity,
            confidence = event.confidence,
            deduction = accepted.deduction,
            score = resulting_score,
            "Accepted detection"
        );

        let alert = ProctorEvent::DetectionAlert {
            event_id: event.id,
            session_id,
            kind: event.kind,
            severity: event.severity,
            confidence: event.confidence,
            deduction: accepted.deduction,
            resulting_score,
            timestamp: event.timestamp,
        };
        self.registry.fan_out(&guard, &alert, None);

        if event.severity.is_alerting() {
            let critical = ProctorEvent::CriticalAlert {
                session_id,
                kind: event.kind,
                severity: event.severity,
                message: format!(
                    "{} ({} severity, confidence {:.2})",
                    event.kind.label(),
                    event.severity,
                    event.confidence
                ),
                timestamp: event.timestamp,
            };
            let delivery = self.registry.fan_out(&guard, &critical, None);
            if delivery.dropped > 0 {
                warn!(
                    %session_id,
                    dropped = delivery.dropped,
                    "Critical alert not delivered to every connection"
                );
            }
        }

        Ok(accepted)
    }
}
