//! Shared API functionality
//!
//! Bearer token issue/verify and the error body shape used by every
//! HTTP surface of the proctoring services.
//!
//! This module contains ONLY pure functions, database operations and
//! shared types. Framework-specific extraction (Axum middleware) lives in
//! the service crates.

pub mod auth;
pub mod types;

pub use auth::{calculate_hash, issue_token, to_canonical_json, verify_token, ApiAuthError};
#[cfg(feature = "sqlx")]
pub use auth::{initialize_shared_secret, load_shared_secret};
pub use types::ErrorResponse;
