//! Bearer-token authentication middleware
//!
//! The token comes from `Authorization: Bearer <token>`, or from the
//! `token` query parameter for clients (such as `EventSource`) that cannot
//! set headers. On success the [`Principal`] is placed in the request
//! extensions for handlers to extract.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use proctor_common::events::Principal;
use serde::Deserialize;

use super::error::ApiError;
use super::server::AppContext;
use crate::error::Error;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?;
    Some(token.trim().to_string())
}

fn query_token(request: &Request) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token)
}

pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .or_else(|| query_token(&request))
        .ok_or_else(|| Error::Authentication("missing bearer token".to_string()))?;

    let principal: Principal = ctx.service.authenticate(&token)?;
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
