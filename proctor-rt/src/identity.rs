//! Identity verification
//!
//! Tokens are checked once, when a connection is opened; individual
//! messages on that connection are not re-verified.

use proctor_common::api::{verify_token, ApiAuthError};
use proctor_common::events::Principal;
use proctor_common::time;

use crate::error::{Error, Result};

/// Turns a bearer credential into a principal
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal>;
}

/// Verifies tokens signed with the deployment's shared secret
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    shared_secret: i64,
}

impl TokenVerifier {
    pub fn new(shared_secret: i64) -> Self {
        Self { shared_secret }
    }
}

impl IdentityVerifier for TokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal> {
        verify_token(token, self.shared_secret, time::now_millis()).map_err(|e| match e {
            ApiAuthError::DatabaseError(msg) => Error::Authentication(format!("unavailable: {}", msg)),
            other => Error::Authentication(other.to_string()),
        })
    }
}
