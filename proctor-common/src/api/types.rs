//! Shared API request/response types

use serde::{Deserialize, Serialize};

/// Error body returned by every proctoring HTTP endpoint
///
/// `error` is a stable machine-readable kind (`access_window`,
/// `not_in_room`, ...). `reason` is set for access-window denials so the
/// client can tell "not started yet" from "expired".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
