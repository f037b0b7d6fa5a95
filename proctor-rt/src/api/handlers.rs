//! HTTP request handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use proctor_common::events::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppContext;
use crate::connection::ConnectionId;
use crate::ingest::DetectionInput;
use crate::session::{AcceptedEvent, AccessDecision, NewSession, Session};

/// Header naming the connection a detection or leave request acts on
pub const CONNECTION_ID_HEADER: &str = "x-connection-id";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    module: &'static str,
    version: &'static str,
    loaded_sessions: usize,
    connections: usize,
}

/// Detection body; the session comes from the path
#[derive(Debug, Deserialize)]
pub struct DetectionRequest {
    pub kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    /// Instant to evaluate at; defaults to now
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub left: Option<Uuid>,
}

fn connection_id(headers: &HeaderMap) -> Result<ConnectionId, ApiError> {
    let raw = headers
        .get(CONNECTION_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", CONNECTION_ID_HEADER)))?
        .to_str()
        .map_err(|e| ApiError::BadRequest(format!("{}: {}", CONNECTION_ID_HEADER, e)))?;
    raw.parse::<ConnectionId>()
        .map_err(|e| ApiError::BadRequest(format!("{}: {}", CONNECTION_ID_HEADER, e)))
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let registry = ctx.service.registry();
    Json(HealthResponse {
        status: "ok",
        module: "proctor-rt",
        version: env!("CARGO_PKG_VERSION"),
        loaded_sessions: registry.loaded_count().await,
        connections: registry.connection_count().await,
    })
}

/// POST /sessions
pub async fn schedule_session(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = ctx.service.schedule_session(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /sessions/:id
pub async fn get_session(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(ctx.service.get_session(session_id, &principal).await?))
}

/// POST /sessions/:id/start
pub async fn start_session(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(ctx.service.start_session(session_id, &principal).await?))
}

/// POST /sessions/:id/end
pub async fn end_session(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(ctx.service.end_session(session_id, &principal).await?))
}

/// POST /sessions/:id/cancel
pub async fn cancel_session(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(ctx.service.cancel_session(session_id, &principal).await?))
}

/// GET /sessions/:id/access
pub async fn access_decision(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessDecision>, ApiError> {
    let now = query.at.unwrap_or_else(Utc::now);
    Ok(Json(ctx.service.access_decision(session_id, &principal, now).await?))
}

/// GET /sessions/:id/events
pub async fn list_detection_events(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<AcceptedEvent>>, ApiError> {
    Ok(Json(ctx.service.list_detection_events(session_id, &principal).await?))
}

/// POST /sessions/:id/detections
pub async fn ingest_detection(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<DetectionRequest>,
) -> Result<(StatusCode, Json<AcceptedEvent>), ApiError> {
    let connection_id = connection_id(&headers)?;
    let input = DetectionInput {
        session_id,
        kind: request.kind,
        confidence: request.confidence,
        timestamp: request.timestamp,
        details: request.details,
    };
    let accepted = ctx.service.ingest(&principal, &connection_id, input).await?;
    Ok((StatusCode::CREATED, Json(accepted)))
}

/// POST /connections/leave
pub async fn leave(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<LeaveResponse>, ApiError> {
    let connection_id = connection_id(&headers)?;
    let left = ctx.service.leave_as(&principal, &connection_id).await?;
    Ok(Json(LeaveResponse { left }))
}
