//! Scoring policy: severity classification plus the deduction ledger

pub mod ledger;
pub mod severity;

pub use ledger::{apply_deduction, DeductionTable, TierDeductions, TierOverrides, MAX_SCORE, MIN_SCORE};
pub use severity::{classify, EscalationPolicy};

use proctor_common::events::{DetectionKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// `[scoring]` section of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub deductions: HashMap<DetectionKind, TierOverrides>,
    pub escalation: EscalationPolicy,
}

/// Outcome of scoring a single detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub severity: Severity,
    pub deduction: f64,
}

/// Classifier and ledger bundled for the ingestion pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringPolicy {
    pub deductions: DeductionTable,
    pub escalation: EscalationPolicy,
}

impl ScoringPolicy {
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Ok(Self {
            deductions: DeductionTable::with_overrides(&config.deductions)?,
            escalation: config.escalation.clone(),
        })
    }

    pub fn assess(&self, kind: DetectionKind, confidence: f64) -> Assessment {
        let severity = self.escalation.severity_for(kind, confidence);
        Assessment {
            severity,
            deduction: self.deductions.deduction(kind, severity),
        }
    }
}
