//! Detection kind, severity tier and per-kind detail payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Behavioral detection kinds reported by the browser-side detectors
///
/// Wire format is kebab-case (`"phone-detected"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionKind {
    /// Candidate looked away from the screen or the tab lost focus
    FocusLost,
    /// No face found in the camera frame
    FaceAbsent,
    /// More than one face found in the camera frame
    MultipleFaces,
    /// Mobile phone recognised in the frame
    PhoneDetected,
    /// Book or printed notes recognised in the frame
    BookDetected,
    /// Other electronic device (laptop, tablet, earpiece) recognised
    DeviceDetected,
    /// Eye-closure pattern consistent with drowsiness
    DrowsinessDetected,
    /// Speech or background voices picked up by the microphone
    AudioViolation,
}

impl DetectionKind {
    /// All eight kinds, in declaration order
    pub const ALL: [DetectionKind; 8] = [
        DetectionKind::FocusLost,
        DetectionKind::FaceAbsent,
        DetectionKind::MultipleFaces,
        DetectionKind::PhoneDetected,
        DetectionKind::BookDetected,
        DetectionKind::DeviceDetected,
        DetectionKind::DrowsinessDetected,
        DetectionKind::AudioViolation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionKind::FocusLost => "focus-lost",
            DetectionKind::FaceAbsent => "face-absent",
            DetectionKind::MultipleFaces => "multiple-faces",
            DetectionKind::PhoneDetected => "phone-detected",
            DetectionKind::BookDetected => "book-detected",
            DetectionKind::DeviceDetected => "device-detected",
            DetectionKind::DrowsinessDetected => "drowsiness-detected",
            DetectionKind::AudioViolation => "audio-violation",
        }
    }

    /// Human-readable label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            DetectionKind::FocusLost => "Focus lost",
            DetectionKind::FaceAbsent => "Face absent",
            DetectionKind::MultipleFaces => "Multiple faces",
            DetectionKind::PhoneDetected => "Phone detected",
            DetectionKind::BookDetected => "Book detected",
            DetectionKind::DeviceDetected => "Device detected",
            DetectionKind::DrowsinessDetected => "Drowsiness detected",
            DetectionKind::AudioViolation => "Audio violation",
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DetectionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown detection kind '{}'", s)))
    }
}

/// Severity tier of a detection
///
/// Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical detections also raise a priority alert
    pub fn is_alerting(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Severity::ALL
            .iter()
            .copied()
            .find(|severity| severity.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown severity '{}'", s)))
    }
}

/// Bounding box in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    fn validate(&self) -> Result<()> {
        let fields = [self.x, self.y, self.width, self.height];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidInput(
                "bounding_box fields must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Structured detail payload, one shape per family of detection kinds
///
/// Unknown fields in the incoming JSON are ignored; known fields with the
/// wrong type are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DetectionDetails {
    /// focus-lost, face-absent, drowsiness-detected
    Attention { duration_ms: Option<u64> },
    /// multiple-faces
    Faces { face_count: Option<u32> },
    /// phone-detected, book-detected, device-detected
    Object {
        bounding_box: Option<BoundingBox>,
        label: Option<String>,
    },
    /// audio-violation
    Audio {
        duration_ms: Option<u64>,
        level_db: Option<f64>,
    },
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AttentionFields {
    duration_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FacesFields {
    face_count: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ObjectFields {
    bounding_box: Option<BoundingBox>,
    label: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AudioFields {
    duration_ms: Option<u64>,
    level_db: Option<f64>,
}

impl DetectionDetails {
    /// Parse a raw detail object into the shape owned by `kind`
    ///
    /// A missing or `null` payload yields the shape with every field unset.
    pub fn parse(kind: DetectionKind, raw: Option<&Value>) -> Result<Self> {
        let raw = match raw {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(value) if value.is_object() => value.clone(),
            Some(_) => {
                return Err(Error::InvalidInput("details must be a JSON object".to_string()))
            }
        };

        fn fields<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T> {
            serde_json::from_value(raw)
                .map_err(|e| Error::InvalidInput(format!("malformed details: {}", e)))
        }

        let details = match kind {
            DetectionKind::FocusLost
            | DetectionKind::FaceAbsent
            | DetectionKind::DrowsinessDetected => {
                let f: AttentionFields = fields(raw)?;
                DetectionDetails::Attention { duration_ms: f.duration_ms }
            }
            DetectionKind::MultipleFaces => {
                let f: FacesFields = fields(raw)?;
                if let Some(count) = f.face_count {
                    if count < 2 {
                        return Err(Error::InvalidInput(format!(
                            "face_count must be at least 2 for multiple-faces, got {}",
                            count
                        )));
                    }
                }
                DetectionDetails::Faces { face_count: f.face_count }
            }
            DetectionKind::PhoneDetected
            | DetectionKind::BookDetected
            | DetectionKind::DeviceDetected => {
                let f: ObjectFields = fields(raw)?;
                if let Some(bbox) = &f.bounding_box {
                    bbox.validate()?;
                }
                DetectionDetails::Object {
                    bounding_box: f.bounding_box,
                    label: f.label,
                }
            }
            DetectionKind::AudioViolation => {
                let f: AudioFields = fields(raw)?;
                DetectionDetails::Audio {
                    duration_ms: f.duration_ms,
                    level_db: f.level_db,
                }
            }
        };

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names_round_trip_through_from_str() {
        for kind in DetectionKind::ALL {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, Value::String(kind.as_str().to_string()));
            assert_eq!(kind.as_str().parse::<DetectionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("gaze-drift".parse::<DetectionKind>().is_err());
        assert!("PhoneDetected".parse::<DetectionKind>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(!Severity::Medium.is_alerting());
        assert!(Severity::High.is_alerting());
        assert!(Severity::Critical.is_alerting());
    }

    #[test]
    fn test_details_shape_follows_kind() {
        let details = DetectionDetails::parse(
            DetectionKind::PhoneDetected,
            Some(&json!({"bounding_box": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}})),
        )
        .unwrap();
        assert!(matches!(
            details,
            DetectionDetails::Object { bounding_box: Some(_), label: None }
        ));

        let details =
            DetectionDetails::parse(DetectionKind::FocusLost, Some(&json!({"duration_ms": 4200})))
                .unwrap();
        assert_eq!(details, DetectionDetails::Attention { duration_ms: Some(4200) });

        let details = DetectionDetails::parse(DetectionKind::MultipleFaces, None).unwrap();
        assert_eq!(details, DetectionDetails::Faces { face_count: None });
    }

    #[test]
    fn test_details_ignore_unknown_fields() {
        let details = DetectionDetails::parse(
            DetectionKind::AudioViolation,
            Some(&json!({"level_db": -12.5, "model": "vad-v2"})),
        )
        .unwrap();
        assert_eq!(
            details,
            DetectionDetails::Audio { duration_ms: None, level_db: Some(-12.5) }
        );
    }

    #[test]
    fn test_details_rejects_bad_payloads() {
        assert!(DetectionDetails::parse(DetectionKind::FocusLost, Some(&json!([1, 2]))).is_err());
        assert!(DetectionDetails::parse(
            DetectionKind::FocusLost,
            Some(&json!({"duration_ms": "long"}))
        )
        .is_err());
        assert!(DetectionDetails::parse(
            DetectionKind::MultipleFaces,
            Some(&json!({"face_count": 1}))
        )
        .is_err());
        assert!(DetectionDetails::parse(
            DetectionKind::BookDetected,
            Some(&json!({"bounding_box": {"x": -1.0, "y": 0.0, "width": 0.1, "height": 0.1}}))
        )
        .is_err());
    }
}
