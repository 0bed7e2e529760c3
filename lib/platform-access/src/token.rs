//! Bearer token utilities.
//!
//! Tokens are JWTs: `base64url(header).base64url(payload).signature`. Only the
//! payload is read here. Signature verification belongs to the identity
//! provider, which issued the token over TLS in the first place.
//!
//! Everything in this module fails closed: a token whose payload cannot be
//! read, or that lacks an `exp` claim, is treated as expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Errors from token decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token is not a three-part JWT or its payload is not a JSON object.
    Malformed { reason: String },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Claims carried in a token payload.
///
/// `exp` is seconds since the Unix epoch. Claims other than the standard
/// ones are kept verbatim in `extra` and read with [`TokenClaims::claim`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (provider user id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry, seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at, seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// All remaining claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Returns a non-standard claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Returns a non-standard claim as a string, if it is one.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(Value::as_str)
    }

    /// Returns the expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Decodes a token payload without verifying the signature.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] if the token does not have three
/// dot-separated parts, the payload is not base64url, or it is not a JSON
/// object.
pub fn decode(token: &str) -> Result<TokenClaims, TokenError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed {
            reason: format!("expected 3 segments, got {}", parts.len()),
        });
    }

    let payload = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::Malformed {
            reason: format!("payload is not base64url: {e}"),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed {
        reason: format!("payload is not a claims object: {e}"),
    })
}

/// Returns the token's expiry, or `None` if it cannot be determined.
#[must_use]
pub fn expiration_time(token: &str) -> Option<DateTime<Utc>> {
    decode(token).ok().and_then(|claims| claims.expires_at())
}

/// Returns true if the token is expired, malformed, or has no expiry.
#[must_use]
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Same as [`is_expired`] against an explicit clock reading.
#[must_use]
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expiration_time(token) {
        Some(expires_at) => now >= expires_at,
        None => true,
    }
}
