//! Per-session room: the set of joined connections and their outboxes
//!
//! Delivery is best-effort. A full or closed outbox drops that one message
//! for that one recipient; it never blocks the sender or the other members.

use proctor_common::events::{ParticipantInfo, Principal, ProctorEvent};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionId};

/// A joined connection as seen by its room
#[derive(Debug, Clone)]
pub struct Member {
    pub principal: Principal,
    outbox: mpsc::Sender<ProctorEvent>,
}

impl Member {
    pub fn from_connection(connection: &Connection) -> Self {
        Self {
            principal: connection.principal,
            outbox: connection.outbox().clone(),
        }
    }
}

/// Counts from one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Room {
    members: HashMap<ConnectionId, Member>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already a member
    pub fn insert(&mut self, id: ConnectionId, member: Member) -> bool {
        self.members.insert(id, member).is_none()
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Member> {
        self.members.remove(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn participants(&self) -> Vec<ParticipantInfo> {
        let mut participants: Vec<ParticipantInfo> = self
            .members
            .iter()
            .map(|(id, member)| ParticipantInfo {
                connection_id: id.as_uuid(),
                user_id: member.principal.user_id,
                role: member.principal.role,
            })
            .collect();
        participants.sort_by_key(|p| p.connection_id);
        participants
    }

    /// Deliver to a single member; false if absent or the outbox refused it
    pub fn send_to(&self, id: &ConnectionId, event: ProctorEvent) -> bool {
        match self.members.get(id) {
            Some(member) => try_deliver(id, member, event),
            None => false,
        }
    }

    /// Deliver to every member except `exclude`
    pub fn broadcast(&self, event: &ProctorEvent, exclude: Option<&ConnectionId>) -> Delivery {
        let mut delivery = Delivery::default();
        for (id, member) in &self.members {
            if Some(id) == exclude {
                continue;
            }
            if try_deliver(id, member, event.clone()) {
                delivery.delivered += 1;
            } else {
                delivery.dropped += 1;
            }
        }
        delivery
    }
}

fn try_deliver(id: &ConnectionId, member: &Member, event: ProctorEvent) -> bool {
    let priority = event.is_priority();
    let event_type = event.event_type();
    match member.outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            if priority {
                warn!(connection = %id, event_type, "Outbox full, dropped priority message");
            } else {
                debug!(connection = %id, event_type, "Outbox full, dropped message");
            }
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection = %id, event_type, "Outbox closed");
            false
        }
    }
}
