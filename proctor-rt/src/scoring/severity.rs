//! Severity classifier
//!
//! Confidence maps to a base tier through fixed breakpoints; the
//! escalation policy is the only path to `critical`.

use proctor_common::events::{DetectionKind, Severity};
use serde::{Deserialize, Serialize};

/// Confidence strictly above this is `high`
pub const HIGH_BREAKPOINT: f64 = 0.8;

/// Confidence strictly above this (and not above HIGH_BREAKPOINT) is `medium`
pub const MEDIUM_BREAKPOINT: f64 = 0.6;

/// Default confidence at which a `high` detection becomes `critical`
pub const DEFAULT_CRITICAL_CONFIDENCE: f64 = 0.95;

/// Base three-tier classification
pub fn classify(confidence: f64) -> Severity {
    if confidence > HIGH_BREAKPOINT {
        Severity::High
    } else if confidence > MEDIUM_BREAKPOINT {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Promotion rule from `high` to `critical`
///
/// A `high` detection whose confidence is at least `critical_confidence`
/// and whose kind is listed in `kinds` is promoted. Nothing else changes
/// tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    pub critical_confidence: f64,
    pub kinds: Vec<DetectionKind>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            critical_confidence: DEFAULT_CRITICAL_CONFIDENCE,
            kinds: DetectionKind::ALL.to_vec(),
        }
    }
}

impl EscalationPolicy {
    /// Policy that never promotes
    pub fn disabled() -> Self {
        Self {
            critical_confidence: DEFAULT_CRITICAL_CONFIDENCE,
            kinds: Vec::new(),
        }
    }

    pub fn escalate(&self, kind: DetectionKind, confidence: f64, severity: Severity) -> Severity {
        if severity == Severity::High
            && confidence >= self.critical_confidence
            && self.kinds.contains(&kind)
        {
            Severity::Critical
        } else {
            severity
        }
    }

    /// Classify then escalate
    pub fn severity_for(&self, kind: DetectionKind, confidence: f64) -> Severity {
        self.escalate(kind, confidence, classify(confidence))
    }
}
