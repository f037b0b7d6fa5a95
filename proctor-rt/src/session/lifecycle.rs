//! Session state machine
//!
//! `Scheduled → InProgress → Completed`, `Scheduled → Cancelled`.
//! Transitions are pure: they take the current session and return the
//! next one, so a failed durable write leaves the in-memory copy intact.
//!
//! The access window is a separate, stateless decision evaluated on every
//! candidate read or join. Nothing ends a session when its window closes;
//! new access is refused instead.

use chrono::{DateTime, Utc};
use proctor_common::events::{AccessDenialReason, Principal, Role, SessionStatus};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::session::model::Session;

/// Result of an access-window check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny(AccessDenialReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Convert a denial into the matching error
    pub fn into_result(self) -> Result<()> {
        match self {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => Err(Error::AccessWindow(reason)),
        }
    }
}

/// Candidate access-window rule
///
/// Completed wins over timing; the window is `[scheduled_at, window_end]`
/// inclusive at both ends.
pub fn window_decision(session: &Session, now: DateTime<Utc>) -> AccessDecision {
    if session.status == SessionStatus::Completed {
        AccessDecision::Deny(AccessDenialReason::AlreadyCompleted)
    } else if now < session.scheduled_at {
        AccessDecision::Deny(AccessDenialReason::NotStarted)
    } else if now > session.window_end() {
        AccessDecision::Deny(AccessDenialReason::Expired)
    } else {
        AccessDecision::Allow
    }
}

/// Whether `principal` is this session's candidate, its interviewer, or an admin
pub fn is_participant(session: &Session, principal: &Principal) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::Interviewer => principal.user_id == session.interviewer_id,
        Role::Candidate => principal.user_id == session.candidate_id,
    }
}

/// Fail with `Authorization` unless `principal` belongs to the session
pub fn authorize(session: &Session, principal: &Principal) -> Result<()> {
    if is_participant(session, principal) {
        Ok(())
    } else {
        Err(Error::Authorization(format!(
            "{} {} is not a participant of session {}",
            principal.role, principal.user_id, session.id
        )))
    }
}

/// Access decision for `principal`; interviewers and admins are exempt
/// from the window
pub fn access_decision(
    session: &Session,
    principal: &Principal,
    now: DateTime<Utc>,
) -> Result<AccessDecision> {
    authorize(session, principal)?;
    match principal.role {
        Role::Candidate => Ok(window_decision(session, now)),
        Role::Interviewer | Role::Admin => Ok(AccessDecision::Allow),
    }
}

/// `Scheduled → InProgress`
pub fn start(session: &Session, actor: &Principal, now: DateTime<Utc>) -> Result<Session> {
    authorize(session, actor)?;
    if session.status != SessionStatus::Scheduled {
        return Err(Error::InvalidState(format!(
            "cannot start session {} in status {}",
            session.id, session.status
        )));
    }

    Ok(Session {
        status: SessionStatus::InProgress,
        started_at: Some(now),
        ..session.clone()
    })
}

/// `InProgress → Completed`
pub fn end(session: &Session, actor: &Principal, now: DateTime<Utc>) -> Result<Session> {
    authorize(session, actor)?;
    if session.status != SessionStatus::InProgress {
        return Err(Error::InvalidState(format!(
            "cannot end session {} in status {}",
            session.id, session.status
        )));
    }

    Ok(Session {
        status: SessionStatus::Completed,
        ended_at: Some(now),
        ..session.clone()
    })
}

/// `Scheduled → Cancelled`; interviewer or admin only
pub fn cancel(session: &Session, actor: &Principal, now: DateTime<Utc>) -> Result<Session> {
    authorize(session, actor)?;
    if actor.role == Role::Candidate {
        return Err(Error::Authorization(
            "candidates cannot cancel a session".to_string(),
        ));
    }
    if session.status != SessionStatus::Scheduled {
        return Err(Error::InvalidState(format!(
            "cannot cancel session {} in status {}",
            session.id, session.status
        )));
    }

    Ok(Session {
        status: SessionStatus::Cancelled,
        ended_at: Some(now),
        ..session.clone()
    })
}
