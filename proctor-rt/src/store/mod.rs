//! Durable store collaborator
//!
//! The session core never owns storage. Everything durable goes through
//! [`DurableStore`], and every call made while a session lock is held is
//! bounded by [`with_store_timeout`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::session::model::{AcceptedEvent, Session};

/// Durable collaborator failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// An update targeted a session the store does not have
    #[error("Session {0} does not exist in the store")]
    Missing(Uuid),

    /// A write targeted a session that is already completed or cancelled
    #[error("Session {0} is finalized")]
    Finalized(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for sessions and their detection logs
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Persist status, started_at and ended_at
    ///
    /// Score and lifecycle writes are refused with `Finalized` once the
    /// stored status is terminal.
    async fn save_session_lifecycle(&self, session: &Session) -> Result<(), StoreError>;

    async fn save_session_score(&self, session_id: Uuid, score: f64) -> Result<(), StoreError>;

    async fn append_detection_event(&self, accepted: &AcceptedEvent) -> Result<(), StoreError>;

    /// Append the event and write its resulting score as one unit
    ///
    /// Either both land or neither does.
    async fn record_detection(&self, accepted: &AcceptedEvent) -> Result<(), StoreError>;

    /// Detection log for a session, oldest first
    async fn list_detection_events(&self, session_id: Uuid) -> Result<Vec<AcceptedEvent>, StoreError>;
}

/// Run a store call with an upper bound on its duration
///
/// An elapsed call is dropped, which abandons any open transaction.
pub async fn with_store_timeout<T, F>(limit: Duration, op: F) -> crate::Result<T>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(crate::Error::Timeout("durable store")),
    }
}
