//! Test helper modules for proctor-rt integration tests
//!
//! - Harness: a ProctorService over an in-memory store, plus principals
//!   and token helpers

#![allow(dead_code)]

pub mod harness;

pub use harness::{drain, event_types, Harness, Participants, SECRET};
