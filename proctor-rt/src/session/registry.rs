//! Session registry
//!
//! Owns every loaded session together with its room. Each session sits
//! behind its own `tokio::sync::Mutex`; holding that guard is the only way
//! to read-modify-write a session's score, status or room, so concurrent
//! operations on one session serialize while different sessions never
//! contend.
//!
//! Lock order: session guard, then the membership map. Nothing acquires a
//! session guard while holding the membership map or while holding another
//! session's guard.
//!
//! Sessions are loaded lazily from the durable store on first use and
//! evicted once their room is empty and their status is terminal.

use chrono::{DateTime, Utc};
use proctor_common::events::{EventBus, Principal, ProctorEvent, SessionStatus};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::session::lifecycle;
use crate::session::model::Session;
use crate::session::room::{Delivery, Member, Room};
use crate::store::{with_store_timeout, DurableStore, StoreError};

/// Mutable state of one loaded session
#[derive(Debug)]
pub struct SessionState {
    pub session: Session,
    pub room: Room,
    evicted: bool,
}

impl SessionState {
    fn new(session: Session) -> Self {
        Self {
            session,
            room: Room::new(),
            evicted: false,
        }
    }
}

/// Exclusive access to one session
pub type SessionGuard = OwnedMutexGuard<SessionState>;

/// Which room a connection is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub session_id: Uuid,
    pub principal: Principal,
}

/// Returned by a successful join
#[derive(Debug, Clone, PartialEq)]
pub struct RoomHandle {
    pub session_id: Uuid,
    pub connection_id: ConnectionId,
    pub status: SessionStatus,
    pub integrity_score: f64,
}

/// Registry timing bounds
#[derive(Debug, Clone, Copy)]
pub struct RegistryTimeouts {
    pub lock: Duration,
    pub store: Duration,
}

impl Default for RegistryTimeouts {
    fn default() -> Self {
        Self {
            lock: Duration::from_millis(2000),
            store: Duration::from_millis(5000),
        }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionState>>>>,
    memberships: RwLock<HashMap<ConnectionId, Membership>>,
    /// Bumped on every eviction, under the `sessions` write lock
    evictions: AtomicU64,
    store: Arc<dyn DurableStore>,
    bus: EventBus,
    timeouts: RegistryTimeouts,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DurableStore>, bus: EventBus, timeouts: RegistryTimeouts) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            evictions: AtomicU64::new(0),
            store,
            bus,
            timeouts,
        }
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Run a durable-store call under the configured store timeout
    pub async fn persist<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        with_store_timeout(self.timeouts.store, op).await
    }

    /// Fetch the slot for a session, loading it from the store if needed
    ///
    /// A copy read from the store is only installed if no eviction happened
    /// while it was being read; otherwise it may predate a transition that
    /// was committed and evicted in the meantime, and is read again.
    async fn slot(&self, session_id: Uuid) -> Result<Arc<Mutex<SessionState>>> {
        loop {
            if let Some(slot) = self.sessions.read().await.get(&session_id) {
                return Ok(Arc::clone(slot));
            }

            let generation = self.evictions.load(Ordering::Acquire);
            let session = self
                .persist(self.store.load_session(session_id))
                .await?
                .ok_or(Error::SessionNotFound(session_id))?;

            let mut sessions = self.sessions.write().await;
            // Another task may have loaded it while the store call was in flight
            if let Some(slot) = sessions.get(&session_id) {
                return Ok(Arc::clone(slot));
            }
            if self.evictions.load(Ordering::Acquire) != generation {
                debug!(%session_id, "Eviction during load, reloading session");
                continue;
            }

            debug!(%session_id, "Loaded session into registry");
            let slot = Arc::new(Mutex::new(SessionState::new(session)));
            sessions.insert(session_id, Arc::clone(&slot));
            return Ok(slot);
        }
    }

    /// Acquire exclusive access to a session
    ///
    /// Fails with `Timeout` if the guard is not obtained within the lock
    /// timeout, and with `SessionNotFound` if the store has no such session.
    pub async fn lock(&self, session_id: Uuid) -> Result<SessionGuard> {
        let deadline = Instant::now() + self.timeouts.lock;
        loop {
            let slot = self.slot(session_id).await?;
            let guard = tokio::time::timeout_at(deadline, slot.lock_owned())
                .await
                .map_err(|_| Error::Timeout("session lock"))?;
            // Evicted between lookup and lock: reload a fresh slot
            if guard.evicted {
                continue;
            }
            return Ok(guard);
        }
    }

    /// Run `f` with exclusive access to a session's mutable state
    pub async fn with_session_lock<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Result<R> {
        let mut guard = self.lock(session_id).await?;
        let result = f(&mut *guard);
        self.maybe_evict(&mut guard).await;
        Ok(result)
    }

    /// Deliver to a room while its guard is held, mirroring onto the bus
    pub fn fan_out(
        &self,
        state: &SessionState,
        event: &ProctorEvent,
        exclude: Option<&ConnectionId>,
    ) -> Delivery {
        let delivery = state.room.broadcast(event, exclude);
        if delivery.dropped > 0 {
            debug!(
                session_id = %state.session.id,
                event_type = event.event_type(),
                dropped = delivery.dropped,
                "Fan-out skipped unavailable connections"
            );
        }
        self.bus.emit_lossy(event.clone());
        delivery
    }

    /// Deliver a message to every connection in a session's room
    pub async fn broadcast(&self, session_id: Uuid, event: ProctorEvent) -> Result<Delivery> {
        let guard = self.lock(session_id).await?;
        Ok(self.fan_out(&guard, &event, None))
    }

    /// Drop the session from memory if nobody is watching and it can no
    /// longer change
    pub async fn maybe_evict(&self, state: &mut SessionState) {
        if state.evicted || !state.room.is_empty() || !state.session.status.is_terminal() {
            return;
        }
        state.evicted = true;
        let mut sessions = self.sessions.write().await;
        sessions.remove(&state.session.id);
        self.evictions.fetch_add(1, Ordering::AcqRel);
        drop(sessions);
        debug!(session_id = %state.session.id, status = %state.session.status, "Evicted session");
    }

    pub async fn membership(&self, connection_id: &ConnectionId) -> Option<Membership> {
        self.memberships.read().await.get(connection_id).copied()
    }

    pub async fn is_loaded(&self, session_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    pub async fn loaded_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.memberships.read().await.len()
    }

    fn check_access(state: &SessionState, principal: &Principal, now: DateTime<Utc>) -> Result<()> {
        lifecycle::access_decision(&state.session, principal, now)?.into_result()
    }

    /// Join `connection` to a session's room
    ///
    /// The joiner receives a `SessionSnapshot`; everyone else in the room
    /// receives `ParticipantJoined`. Joining the room the connection is
    /// already in only refreshes the snapshot. Joining a different room
    /// leaves the previous one, but only once the new join is known to be
    /// permitted.
    pub async fn join(
        &self,
        connection: &Connection,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RoomHandle> {
        let principal = connection.principal;

        if let Some(previous) = self.membership(&connection.id).await {
            if previous.session_id != session_id {
                {
                    let mut guard = self.lock(session_id).await?;
                    let checked = Self::check_access(&guard, &principal, now);
                    self.maybe_evict(&mut guard).await;
                    checked?;
                }
                self.leave(&connection.id).await?;
            }
        }

        let mut guard = self.lock(session_id).await?;
        if let Err(e) = Self::check_access(&guard, &principal, now) {
            self.maybe_evict(&mut guard).await;
            return Err(e);
        }

        let newly_joined = guard
            .room
            .insert(connection.id, Member::from_connection(connection));
        self.memberships.write().await.insert(
            connection.id,
            Membership {
                session_id,
                principal,
            },
        );

        let snapshot = ProctorEvent::SessionSnapshot {
            session_id,
            status: guard.session.status,
            integrity_score: guard.session.integrity_score,
            participants: guard.room.participants(),
            timestamp: now,
        };
        guard.room.send_to(&connection.id, snapshot);

        if newly_joined {
            let joined = ProctorEvent::ParticipantJoined {
                session_id,
                user_id: principal.user_id,
                role: principal.role,
                timestamp: now,
            };
            self.fan_out(&guard, &joined, Some(&connection.id));
            info!(
                %session_id,
                connection = %connection.id,
                user_id = %principal.user_id,
                role = %principal.role,
                room_size = guard.room.len(),
                "Connection joined session"
            );
        }

        Ok(RoomHandle {
            session_id,
            connection_id: connection.id,
            status: guard.session.status,
            integrity_score: guard.session.integrity_score,
        })
    }

    /// Remove a connection from whatever room it is in
    ///
    /// Returns the session it left, or `None` if it was not joined.
    /// Also used for disconnects.
    pub async fn leave(&self, connection_id: &ConnectionId) -> Result<Option<Uuid>> {
        let Some(membership) = self.membership(connection_id).await else {
            return Ok(None);
        };
        let session_id = membership.session_id;

        let mut guard = self.lock(session_id).await?;
        let removed = guard.room.remove(connection_id);
        {
            let mut memberships = self.memberships.write().await;
            if memberships
                .get(connection_id)
                .is_some_and(|m| m.session_id == session_id)
            {
                memberships.remove(connection_id);
            }
        }

        if let Some(member) = removed {
            let left = ProctorEvent::ParticipantLeft {
                session_id,
                user_id: member.principal.user_id,
                role: member.principal.role,
                timestamp: Utc::now(),
            };
            self.fan_out(&guard, &left, None);
            info!(
                %session_id,
                connection = %connection_id,
                room_size = guard.room.len(),
                "Connection left session"
            );
        }

        self.maybe_evict(&mut guard).await;
        Ok(Some(session_id))
    }

    /// Store a newly scheduled session; it is loaded on first use
    pub async fn create(&self, session: &Session) -> Result<()> {
        self.persist(self.store.create_session(session)).await?;
        info!(
            session_id = %session.id,
            scheduled_at = %session.scheduled_at,
            duration_minutes = session.duration_minutes,
            "Scheduled session"
        );
        Ok(())
    }

    /// Apply a lifecycle transition under the session guard
    ///
    /// The new status is written to the store before memory is updated, so
    /// a failed or timed-out write leaves the session as it was. Success
    /// broadcasts `LifecycleChanged` to the whole room.
    pub async fn transition<F>(&self, session_id: Uuid, f: F) -> Result<Session>
    where
        F: FnOnce(&Session) -> Result<Session>,
    {
        let mut guard = self.lock(session_id).await?;
        let next = match f(&guard.session) {
            Ok(next) => next,
            Err(e) => {
                self.maybe_evict(&mut guard).await;
                return Err(e);
            }
        };

        self.persist(self.store.save_session_lifecycle(&next)).await?;
        let previous = guard.session.status;
        guard.session = next.clone();

        let changed = ProctorEvent::LifecycleChanged {
            session_id,
            status: next.status,
            timestamp: Utc::now(),
        };
        self.fan_out(&guard, &changed, None);
        info!(%session_id, from = %previous, to = %next.status, "Session status changed");

        self.maybe_evict(&mut guard).await;
        Ok(next)
    }

    /// Current state of a session as seen by `principal`
    pub async fn snapshot(
        &self,
        session_id: Uuid,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        self.with_session_lock(session_id, |state| {
            Self::check_access(state, principal, now).map(|_| state.session.clone())
        })
        .await?
    }
}
