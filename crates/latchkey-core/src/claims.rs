//! Access-token claims decoding.
//!
//! Access tokens are opaque compact strings in the usual three-segment
//! form; the middle segment is a base64url JSON object. This module only
//! reads claims the engine needs (expiry, sign-in session id) and never
//! verifies signatures: the SDK consumes tokens, it does not issue them.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::*;
use serde::Deserialize;

/// Claims the engine cares about. Unknown claims are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since epoch.
    pub exp: u64,
    /// Sign-in session id, when the issuer embeds it.
    #[serde(default)]
    pub sid: Option<String>,
    /// Subject, when present.
    #[serde(default)]
    pub sub: Option<String>,
}

impl Claims {
    /// True while `exp - now > buffer`: the token can still be used
    /// without risking rejection mid-flight.
    pub fn is_fresh(&self, now_secs: u64, buffer_secs: u64) -> bool {
        self.exp > now_secs.saturating_add(buffer_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not in compact three-segment form")]
    Malformed,
    #[error("claims segment did not decode: {0}")]
    Decode(String),
}

/// Decodes the claims segment of a compact token. Pure; no expiry check.
pub fn decode(token: &str) -> Result<Claims, ClaimsError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ClaimsError::Malformed),
    };
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| ClaimsError::Decode(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| ClaimsError::Decode(err.to_string()))
}

/// Current time, seconds since epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
