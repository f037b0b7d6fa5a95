//! Score ledger
//!
//! Maps (detection kind, severity tier) to a deduction and owns the
//! clamping arithmetic. Pure; the magnitudes are policy data that the
//! config file can override per kind and tier.

use proctor_common::events::{DetectionKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Upper bound of the integrity score; every session starts here
pub const MAX_SCORE: f64 = 100.0;

/// Lower bound of the integrity score
pub const MIN_SCORE: f64 = 0.0;

/// Deduction used for a (kind, severity) pair missing from the table
pub const FALLBACK_DEDUCTION: f64 = 1.0;

/// Deductions for the four tiers of one detection kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierDeductions {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierDeductions {
    pub const fn new(low: f64, medium: f64, high: f64, critical: f64) -> Self {
        Self { low, medium, high, critical }
    }
}

/// Partial per-kind override as written in the config file
///
/// ```toml
/// [scoring.deductions.phone-detected]
/// high = 15.0
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierOverrides {
    pub low: Option<f64>,
    pub medium: Option<f64>,
    pub high: Option<f64>,
    pub critical: Option<f64>,
}

impl TierOverrides {
    fn entries(&self) -> [(Severity, Option<f64>); 4] {
        [
            (Severity::Low, self.low),
            (Severity::Medium, self.medium),
            (Severity::High, self.high),
            (Severity::Critical, self.critical),
        ]
    }
}

/// Standard deduction policy, one row per detection kind
pub const STANDARD_DEDUCTIONS: [(DetectionKind, TierDeductions); 8] = [
    (DetectionKind::FocusLost, TierDeductions::new(0.5, 1.0, 2.0, 3.0)),
    (DetectionKind::FaceAbsent, TierDeductions::new(2.0, 3.0, 5.0, 8.0)),
    (DetectionKind::MultipleFaces, TierDeductions::new(5.0, 8.0, 10.0, 15.0)),
    (DetectionKind::PhoneDetected, TierDeductions::new(5.0, 8.0, 12.0, 20.0)),
    (DetectionKind::BookDetected, TierDeductions::new(3.0, 5.0, 8.0, 12.0)),
    (DetectionKind::DeviceDetected, TierDeductions::new(4.0, 6.0, 10.0, 15.0)),
    (DetectionKind::DrowsinessDetected, TierDeductions::new(1.0, 2.0, 3.0, 5.0)),
    (DetectionKind::AudioViolation, TierDeductions::new(2.0, 3.0, 5.0, 8.0)),
];

/// Lookup table from (kind, severity) to deduction magnitude
#[derive(Debug, Clone, PartialEq)]
pub struct DeductionTable {
    entries: HashMap<(DetectionKind, Severity), f64>,
}

impl Default for DeductionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DeductionTable {
    /// The standard 32-entry policy
    pub fn standard() -> Self {
        let mut entries = HashMap::with_capacity(32);
        for (kind, tiers) in STANDARD_DEDUCTIONS {
            entries.insert((kind, Severity::Low), tiers.low);
            entries.insert((kind, Severity::Medium), tiers.medium);
            entries.insert((kind, Severity::High), tiers.high);
            entries.insert((kind, Severity::Critical), tiers.critical);
        }
        Self { entries }
    }

    /// Build a table from explicit entries; missing pairs use the fallback
    pub fn from_entries(entries: impl IntoIterator<Item = ((DetectionKind, Severity), f64)>) -> Result<Self> {
        let table = Self {
            entries: entries.into_iter().collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Standard table with config overrides applied on top
    pub fn with_overrides(overrides: &HashMap<DetectionKind, TierOverrides>) -> Result<Self> {
        let mut table = Self::standard();
        for (kind, tiers) in overrides {
            for (severity, value) in tiers.entries() {
                if let Some(value) = value {
                    table.entries.insert((*kind, severity), value);
                }
            }
        }
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for ((kind, severity), value) in &self.entries {
            if !value.is_finite() || *value < 0.0 {
                return Err(Error::Config(format!(
                    "deduction for {}/{} must be a non-negative number, got {}",
                    kind, severity, value
                )));
            }
        }
        Ok(())
    }

    /// Deduction for `kind` at `severity`
    ///
    /// Pairs absent from the table cost [`FALLBACK_DEDUCTION`] so a gap in
    /// policy never silently stops scoring.
    pub fn deduction(&self, kind: DetectionKind, severity: Severity) -> f64 {
        self.entries
            .get(&(kind, severity))
            .copied()
            .unwrap_or(FALLBACK_DEDUCTION)
    }
}

/// Subtract `deduction` from `current_score`, clamped to [0, 100]
pub fn apply_deduction(current_score: f64, deduction: f64) -> f64 {
    (current_score - deduction).clamp(MIN_SCORE, MAX_SCORE)
}
