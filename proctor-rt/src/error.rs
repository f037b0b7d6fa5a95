//! Error types for proctor-rt
//!
//! One variant per failure kind a caller has to tell apart. Every public
//! operation returns these as values; nothing is thrown across the
//! broadcast boundary.

use proctor_common::events::{AccessDenialReason, DetectionKind};
use thiserror::Error;
use uuid::Uuid;

use crate::connection::ConnectionId;
use crate::store::StoreError;

/// Why a detection event or schedule request was rejected as malformed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown detection kind '{0}'")]
    UnknownKind(String),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("{0}")]
    MalformedDetails(String),

    #[error("detection kind {0} is disabled for this session")]
    KindDisabled(DetectionKind),

    #[error("confidence {confidence} is below the session threshold {threshold} for {kind}")]
    BelowThreshold {
        kind: DetectionKind,
        confidence: f64,
        threshold: f64,
    },

    #[error("duration {0} minutes is outside 5-180")]
    DurationOutOfRange(u32),
}

/// Main error type for proctor-rt
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing credential
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Valid identity without the role or relationship the operation needs
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Valid identity and role, outside the candidate access window
    #[error("Access denied: {0}")]
    AccessWindow(AccessDenialReason),

    #[error("Invalid detection event: {0}")]
    Validation(#[from] ValidationError),

    /// Event from a connection that is not joined to the target session
    #[error("Connection {connection_id} is not joined to session {session_id}")]
    NotInRoom {
        connection_id: ConnectionId,
        session_id: Uuid,
    },

    /// Lifecycle transition or ingestion attempted in the wrong status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Session lock or durable store did not answer in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable kind, used as the `error` field of HTTP bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication",
            Error::Authorization(_) => "authorization",
            Error::AccessWindow(_) => "access_window",
            Error::Validation(_) => "validation",
            Error::NotInRoom { .. } => "not_in_room",
            Error::InvalidState(_) => "invalid_state",
            Error::Timeout(_) => "timeout",
            Error::Store(_) => "store",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Config(_) => "config",
        }
    }
}

/// Convenience Result type using proctor-rt Error
pub type Result<T> = std::result::Result<T, Error>;
