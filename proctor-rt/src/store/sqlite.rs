//! SQLite-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_common::events::{DetectionDetails, DetectionKind, SessionStatus, Severity};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use super::{DurableStore, StoreError};
use crate::session::model::{AcceptedEvent, DetectionEvent, DetectionSettings, Session};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema was created by `proctor_common::db`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, StoreError> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}

fn parse_enum<T: FromStr>(row: &SqliteRow, column: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn session_from_row(row: &SqliteRow) -> Result<Session, StoreError> {
    let duration: i64 = row.try_get("duration_minutes")?;
    let settings: DetectionSettings = parse_json(row, "detection_settings")?;

    Ok(Session {
        id: parse_uuid(row, "guid")?,
        candidate_id: parse_uuid(row, "candidate_id")?,
        interviewer_id: parse_uuid(row, "interviewer_id")?,
        scheduled_at: row.try_get::<DateTime<Utc>, _>("scheduled_at")?,
        duration_minutes: u32::try_from(duration)
            .map_err(|_| StoreError::Corrupt(format!("duration_minutes {}", duration)))?,
        status: parse_enum::<SessionStatus>(row, "status")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        integrity_score: row.try_get("integrity_score")?,
        detection_settings: settings,
    })
}

fn accepted_from_row(row: &SqliteRow) -> Result<AcceptedEvent, StoreError> {
    let details: DetectionDetails = parse_json(row, "details")?;

    Ok(AcceptedEvent {
        event: DetectionEvent {
            id: parse_uuid(row, "guid")?,
            session_id: parse_uuid(row, "session_id")?,
            timestamp: row.try_get("occurred_at")?,
            kind: parse_enum::<DetectionKind>(row, "kind")?,
            confidence: row.try_get("confidence")?,
            severity: parse_enum::<Severity>(row, "severity")?,
            details,
        },
        deduction: row.try_get("deduction")?,
        resulting_score: row.try_get("resulting_score")?,
    })
}

async fn insert_event<'e, E>(executor: E, accepted: &AcceptedEvent) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let event = &accepted.event;
    sqlx::query(
        r#"
        INSERT INTO detection_events
            (guid, session_id, kind, confidence, severity, deduction, resulting_score, details, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.session_id.to_string())
    .bind(event.kind.as_str())
    .bind(event.confidence)
    .bind(event.severity.as_str())
    .bind(accepted.deduction)
    .bind(accepted.resulting_score)
    .bind(to_json(&event.details)?)
    .bind(event.timestamp)
    .execute(executor)
    .await?;

    Ok(())
}

/// Explain why a guarded update matched no row
async fn refused_update(conn: &mut SqliteConnection, session_id: Uuid) -> StoreError {
    let exists = sqlx::query("SELECT 1 FROM sessions WHERE guid = ?")
        .bind(session_id.to_string())
        .fetch_optional(&mut *conn)
        .await;
    match exists {
        Ok(Some(_)) => StoreError::Finalized(session_id),
        Ok(None) => StoreError::Missing(session_id),
        Err(e) => StoreError::Database(e),
    }
}

async fn update_score(conn: &mut SqliteConnection, session_id: Uuid, score: f64) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE sessions SET integrity_score = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ? AND status NOT IN ('completed', 'cancelled')
        "#,
    )
    .bind(score)
    .bind(session_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(refused_update(conn, session_id).await);
    }
    Ok(())
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (guid, candidate_id, interviewer_id, scheduled_at, duration_minutes,
                 status, started_at, ended_at, integrity_score, detection_settings)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.candidate_id.to_string())
        .bind(session.interviewer_id.to_string())
        .bind(session.scheduled_at)
        .bind(i64::from(session.duration_minutes))
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.integrity_score)
        .bind(to_json(&session.detection_settings)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT guid, candidate_id, interviewer_id, scheduled_at, duration_minutes,
                   status, started_at, ended_at, integrity_score, detection_settings
            FROM sessions
            WHERE guid = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn save_session_lifecycle(&self, session: &Session) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, started_at = ?, ended_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE guid = ? AND status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.id.to_string())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(refused_update(&mut *conn, session.id).await);
        }
        Ok(())
    }

    async fn save_session_score(&self, session_id: Uuid, score: f64) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        update_score(&mut *conn, session_id, score).await
    }

    async fn append_detection_event(&self, accepted: &AcceptedEvent) -> Result<(), StoreError> {
        insert_event(&self.pool, accepted).await
    }

    async fn record_detection(&self, accepted: &AcceptedEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_event(&mut *tx, accepted).await?;
        update_score(&mut *tx, accepted.event.session_id, accepted.resulting_score).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_detection_events(&self, session_id: Uuid) -> Result<Vec<AcceptedEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT guid, session_id, kind, confidence, severity, deduction,
                   resulting_score, details, occurred_at
            FROM detection_events
            WHERE session_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(accepted_from_row).collect()
    }
}
