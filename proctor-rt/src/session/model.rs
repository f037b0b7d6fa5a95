//! Session and detection records

use chrono::{DateTime, Duration, Utc};
use proctor_common::events::{DetectionDetails, DetectionKind, SessionStatus, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::scoring::MAX_SCORE;

/// Shortest schedulable interview
pub const MIN_DURATION_MINUTES: u32 = 5;

/// Longest schedulable interview
pub const MAX_DURATION_MINUTES: u32 = 180;

/// Per-kind detection switch and confidence floor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindSetting {
    pub enabled: bool,
    pub min_confidence: f64,
}

impl Default for KindSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.0,
        }
    }
}

/// Detection settings chosen by the interviewer when scheduling
///
/// Kinds not listed are enabled with no confidence floor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub kinds: BTreeMap<DetectionKind, KindSetting>,
}

impl DetectionSettings {
    pub fn setting(&self, kind: DetectionKind) -> KindSetting {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    /// Reject detections the session asked not to score
    pub fn admit(&self, kind: DetectionKind, confidence: f64) -> Result<(), ValidationError> {
        let setting = self.setting(kind);
        if !setting.enabled {
            return Err(ValidationError::KindDisabled(kind));
        }
        if confidence < setting.min_confidence {
            return Err(ValidationError::BelowThreshold {
                kind,
                confidence,
                threshold: setting.min_confidence,
            });
        }
        Ok(())
    }
}

/// One scheduled interview and its lifecycle/score state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub integrity_score: f64,
    pub detection_settings: DetectionSettings,
}

/// Request to schedule a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub candidate_id: Uuid,
    pub interviewer_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub detection_settings: DetectionSettings,
}

impl Session {
    /// Build a `Scheduled` session with a full score
    pub fn schedule(request: NewSession) -> Result<Self, ValidationError> {
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&request.duration_minutes) {
            return Err(ValidationError::DurationOutOfRange(request.duration_minutes));
        }

        for setting in request.detection_settings.kinds.values() {
            if !(0.0..=1.0).contains(&setting.min_confidence) {
                return Err(ValidationError::ConfidenceOutOfRange(setting.min_confidence));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            candidate_id: request.candidate_id,
            interviewer_id: request.interviewer_id,
            scheduled_at: request.scheduled_at,
            duration_minutes: request.duration_minutes,
            status: SessionStatus::Scheduled,
            started_at: None,
            ended_at: None,
            integrity_score: MAX_SCORE,
            detection_settings: request.detection_settings,
        })
    }

    /// Last instant of the candidate access window
    pub fn window_end(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// One classified detection, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: DetectionKind,
    pub confidence: f64,
    pub severity: Severity,
    pub details: DetectionDetails,
}

/// A detection together with the score change it caused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedEvent {
    pub event: DetectionEvent,
    pub deduction: f64,
    pub resulting_score: f64,
}
