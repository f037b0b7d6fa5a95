//! proctor-rt: real-time proctoring session core
//!
//! Tracks interview session lifecycles, scores streamed behavioural
//! detections into a bounded integrity score under per-session
//! serialization, and fans alerts out to everyone joined to the session's
//! room.

pub mod api;
pub mod audit;
pub mod config;
pub mod connection;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod scoring;
pub mod service;
pub mod session;
pub mod store;

pub use error::{Error, Result, ValidationError};
pub use service::ProctorService;
