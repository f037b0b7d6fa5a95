//! Room stream over Server-Sent Events
//!
//! Opening the stream opens a connection and joins it to the session's
//! room. The new connection id is returned in the `X-Connection-Id` header
//! for use by the detection and leave endpoints. Closing the stream is a
//! disconnect: the connection leaves the room.

use axum::{
    extract::{Path, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    Extension,
};
use proctor_common::events::Principal;
use proctor_common::sse::outbox_sse_stream;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::handlers::CONNECTION_ID_HEADER;
use super::server::AppContext;
use crate::connection::ConnectionId;
use crate::service::ProctorService;

/// Leaves the room when the SSE stream is dropped
struct LeaveOnDrop {
    service: Arc<ProctorService>,
    connection_id: ConnectionId,
}

impl Drop for LeaveOnDrop {
    fn drop(&mut self) {
        let service = Arc::clone(&self.service);
        let connection_id = self.connection_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            debug!(connection = %connection_id, "SSE client disconnected");
            if let Err(e) = service.leave(&connection_id).await {
                warn!(connection = %connection_id, "Leave on disconnect failed: {}", e);
            }
        });
    }
}

/// GET /sessions/:id/stream
pub async fn session_stream(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (connection, rx) = ctx.service.open_connection(principal);
    ctx.service.join_connection(&connection, session_id).await?;

    let guard = LeaveOnDrop {
        service: Arc::clone(&ctx.service),
        connection_id: connection.id,
    };

    let mut response = outbox_sse_stream(rx, guard).into_response();
    let header = HeaderValue::from_str(&connection.id.to_string())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    response.headers_mut().insert(CONNECTION_ID_HEADER, header);
    Ok(response)
}
