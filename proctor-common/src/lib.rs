//! # Proctor Common Library
//!
//! Shared code for the proctoring services including:
//! - Domain enums (detection kinds, severity tiers, session status, roles)
//! - Room message types (ProctorEvent enum) and the process-wide EventBus
//! - Bearer token issue/verify
//! - SQLite schema initialization
//! - Configuration file resolution
//! - SSE helpers

pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
