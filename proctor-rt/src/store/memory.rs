//! In-process store
//!
//! Used by tests and for running without a database file. Writes can be
//! made to fail or to stall, and a load can be held back after it has read
//! its row, so the rollback, timeout and stale-load paths of the session
//! core can be driven deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DurableStore, StoreError};
use crate::session::model::{AcceptedEvent, Session};

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    events: RwLock<HashMap<Uuid, Vec<AcceptedEvent>>>,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
    next_load_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stall every subsequent write for `delay` before applying it
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold the next `load_session` for `delay` after it has read the row
    pub fn delay_next_load(&self, delay: Duration) {
        self.next_load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of logged detection events for a session
    pub async fn event_count(&self, session_id: Uuid) -> usize {
        self.events
            .read()
            .await
            .get(&session_id)
            .map_or(0, Vec::len)
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failure injected".to_string()));
        }
        Ok(())
    }
}

/// Stored session that may still change
fn writable(sessions: &mut HashMap<Uuid, Session>, session_id: Uuid) -> Result<&mut Session, StoreError> {
    let stored = sessions
        .get_mut(&session_id)
        .ok_or(StoreError::Missing(session_id))?;
    if stored.status.is_terminal() {
        return Err(StoreError::Finalized(session_id));
    }
    Ok(stored)
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.before_write().await?;
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let session = self.sessions.read().await.get(&session_id).cloned();
        let delay = self.next_load_delay_ms.swap(0, Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(session)
    }

    async fn save_session_lifecycle(&self, session: &Session) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut sessions = self.sessions.write().await;
        let stored = writable(&mut sessions, session.id)?;
        stored.status = session.status;
        stored.started_at = session.started_at;
        stored.ended_at = session.ended_at;
        Ok(())
    }

    async fn save_session_score(&self, session_id: Uuid, score: f64) -> Result<(), StoreError> {
        self.before_write().await?;
        let mut sessions = self.sessions.write().await;
        let stored = writable(&mut sessions, session_id)?;
        stored.integrity_score = score;
        Ok(())
    }

    async fn append_detection_event(&self, accepted: &AcceptedEvent) -> Result<(), StoreError> {
        self.before_write().await?;
        let session_id = accepted.event.session_id;
        if !self.sessions.read().await.contains_key(&session_id) {
            return Err(StoreError::Missing(session_id));
        }
        self.events
            .write()
            .await
            .entry(session_id)
            .or_default()
            .push(accepted.clone());
        Ok(())
    }

    async fn record_detection(&self, accepted: &AcceptedEvent) -> Result<(), StoreError> {
        self.before_write().await?;
        let session_id = accepted.event.session_id;

        // Lock order sessions → events for the whole unit
        let mut sessions = self.sessions.write().await;
        let stored = writable(&mut sessions, session_id)?;
        let mut events = self.events.write().await;

        stored.integrity_score = accepted.resulting_score;
        events.entry(session_id).or_default().push(accepted.clone());
        Ok(())
    }

    async fn list_detection_events(&self, session_id: Uuid) -> Result<Vec<AcceptedEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}
