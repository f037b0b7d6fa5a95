//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use proctor_common::api::ErrorResponse;
use tracing::{error, warn};

use crate::error::Error;
use crate::store::StoreError;

/// Error returned by HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// Request could not be interpreted (bad header, bad query)
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                Error::Authentication(_) => StatusCode::UNAUTHORIZED,
                Error::Authorization(_) | Error::AccessWindow(_) => StatusCode::FORBIDDEN,
                Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::NotInRoom { .. }
                | Error::InvalidState(_)
                | Error::Store(StoreError::Finalized(_)) => StatusCode::CONFLICT,
                Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
                Error::Store(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest(message) => ErrorResponse::new("bad_request", message.clone()),
            ApiError::Core(err) => {
                let body = ErrorResponse::new(err.kind(), err.to_string());
                match err {
                    Error::AccessWindow(reason) => body.with_reason(reason.as_str()),
                    _ => body,
                }
            }
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, body.message);
        } else if status == StatusCode::UNAUTHORIZED {
            warn!("Rejected request: {}", body.message);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::error::ValidationError;
    use proctor_common::events::AccessDenialReason;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (Error::Authorization("x".into()), StatusCode::FORBIDDEN),
            (Error::AccessWindow(AccessDenialReason::Expired), StatusCode::FORBIDDEN),
            (
                Error::Validation(ValidationError::UnknownKind("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Error::NotInRoom { connection_id: ConnectionId::new(), session_id: Uuid::nil() },
                StatusCode::CONFLICT,
            ),
            (Error::InvalidState("x".into()), StatusCode::CONFLICT),
            (Error::Timeout("session lock"), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Store(StoreError::Unavailable("x".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Store(StoreError::Finalized(Uuid::nil())), StatusCode::CONFLICT),
            (Error::SessionNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    }
}
