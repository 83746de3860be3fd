//! Optional client-side token payload inspection.
//!
//! Some backends bake an expiry claim into the token itself. When an
//! introspector is configured, login clamps the stored TTL down to that
//! claim; the locally stored expiry stays authoritative in every other
//! respect, so opaque or foreign token formats keep working.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::AuthError;

/// Reads the expiry a token carries in its own payload.
pub trait TokenIntrospector: Send + Sync {
    fn token_expiry(&self, token: &str) -> Result<DateTime<Utc>, AuthError>;
}

/// Reads the `exp` claim from an unverified JWT payload. Signature
/// verification is the server's job; this only informs local bookkeeping.
pub struct JwtIntrospector;

#[derive(Deserialize)]
struct ExpClaim {
    exp: i64,
}

impl TokenIntrospector for JwtIntrospector {
    fn token_expiry(&self, token: &str) -> Result<DateTime<Utc>, AuthError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::MalformedToken("not a JWT".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;
        let claim: ExpClaim = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedToken(format!("payload has no exp claim: {e}")))?;
        DateTime::from_timestamp(claim.exp, 0)
            .ok_or_else(|| AuthError::MalformedToken("exp claim out of range".into()))
    }
}

// ============================================================================
// Tests
// ============================================================================
