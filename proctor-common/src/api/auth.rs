//! Bearer token authentication
//!
//! # Token format
//!
//! `<user_id>.<role>.<expires_at_ms>.<signature>`
//!
//! The signature is SHA-256 (64 hex chars) over the canonical JSON of the
//! claims (`{"expires_at":..,"role":..,"user_id":..}`, sorted keys, no
//! whitespace) followed by the shared secret as a decimal i64 string.
//!
//! Identity issuance proper belongs to an upstream service; this module
//! only has to agree with it on the format and the secret. Tokens are
//! verified once per connection, not per message.
//!
//! # Pure Functions
//!
//! Apart from the secret load/initialize pair, everything here is pure.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::events::{Principal, Role};

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the token signing secret
pub const SHARED_SECRET_KEY: &str = "token_shared_secret";

// ========================================
// Error Types
// ========================================

/// Token verification error types
#[derive(Debug, Clone, PartialEq)]
pub enum ApiAuthError {
    /// No token supplied
    MissingToken,

    /// Token does not have the four dot-separated parts, or a part fails to parse
    MalformedToken(String),

    /// Token expiry is in the past
    Expired { expires_at: i64, now: i64 },

    /// Signature does not match the claims
    InvalidSignature,

    /// Database error loading shared secret
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingToken => write!(f, "Missing bearer token"),
            ApiAuthError::MalformedToken(reason) => write!(f, "Malformed token: {}", reason),
            ApiAuthError::Expired { expires_at, now } => {
                write!(f, "Token expired {}ms ago", now - expires_at)
            }
            ApiAuthError::InvalidSignature => write!(f, "Invalid token signature"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Shared Secret Management
// ========================================

/// Load the token signing secret from the settings table
///
/// Generates and stores a new non-zero secret if none exists yet.
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SHARED_SECRET_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate a cryptographically random non-zero i64 and store it
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let secret: i64 = {
        let mut rng = rand::thread_rng();
        loop {
            let val = rng.gen::<i64>();
            if val != 0 {
                break val;
            }
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Hash Calculation
// ========================================

/// SHA-256 of canonical JSON followed by the decimal shared secret
///
/// # Examples
///
/// ```
/// use proctor_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let hash = calculate_hash(&json!({"user_id": "u", "role": "admin"}), 123456789);
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let canonical = to_canonical_json(json_value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// # Examples
///
/// ```
/// use proctor_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1}));
/// assert_eq!(canonical, "{\"a\":1,\"z\":3}");
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Compare two signatures in time independent of where they differ
fn signatures_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn claims(user_id: Uuid, role: Role, expires_at: i64) -> Value {
    json!({
        "user_id": user_id.to_string(),
        "role": role.as_str(),
        "expires_at": expires_at,
    })
}

// ========================================
// Token Issue / Verify
// ========================================

/// Issue a signed token for `principal`, valid until `expires_at` (epoch ms)
pub fn issue_token(principal: &Principal, expires_at: i64, shared_secret: i64) -> String {
    let signature = calculate_hash(
        &claims(principal.user_id, principal.role, expires_at),
        shared_secret,
    );
    format!(
        "{}.{}.{}.{}",
        principal.user_id,
        principal.role.as_str(),
        expires_at,
        signature
    )
}

/// Verify a token and return the principal it names
///
/// `now` is epoch milliseconds; a token is valid up to and including its
/// expiry instant.
pub fn verify_token(token: &str, shared_secret: i64, now: i64) -> Result<Principal, ApiAuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiAuthError::MissingToken);
    }

    let parts: Vec<&str> = token.split('.').collect();
    let [user_id, role, expires_at, signature] = parts.as_slice() else {
        return Err(ApiAuthError::MalformedToken(format!(
            "expected 4 parts, found {}",
            parts.len()
        )));
    };

    let user_id = Uuid::parse_str(user_id)
        .map_err(|e| ApiAuthError::MalformedToken(format!("user id: {}", e)))?;
    let role = role
        .parse::<Role>()
        .map_err(|e| ApiAuthError::MalformedToken(e.to_string()))?;
    let expires_at = expires_at
        .parse::<i64>()
        .map_err(|e| ApiAuthError::MalformedToken(format!("expiry: {}", e)))?;

    let expected = calculate_hash(&claims(user_id, role, expires_at), shared_secret);
    if !signatures_match(signature, &expected) {
        return Err(ApiAuthError::InvalidSignature);
    }

    if now > expires_at {
        return Err(ApiAuthError::Expired { expires_at, now });
    }

    Ok(Principal::new(user_id, role))
}

// ========================================
// Tests
// ========================================
