//! Ephemeral transport connections
//!
//! A connection is created on successful authentication and destroyed on
//! disconnect. It owns the sending half of a bounded outbox; the transport
//! drains the receiving half.

use proctor_common::events::{Principal, ProctorEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// An authenticated connection and its outbox
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub principal: Principal,
    outbox: mpsc::Sender<ProctorEvent>,
}

impl Connection {
    /// Open a connection with an outbox holding up to `capacity` messages
    pub fn open(principal: Principal, capacity: usize) -> (Self, mpsc::Receiver<ProctorEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            principal,
            outbox: tx,
        };
        (connection, rx)
    }

    pub fn outbox(&self) -> &mpsc::Sender<ProctorEvent> {
        &self.outbox
    }
}
