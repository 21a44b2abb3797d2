//! Bearer token handling
//!
//! Tokens are opaque to the session apart from their expiry, which is read
//! from the `exp` claim of the JWT payload without verifying the signature.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

/// A bearer token and its decoded expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Wrap a raw token string, decoding its expiry when possible
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let expires_at = decode_expiry(&raw);
        Self { raw, expires_at }
    }

    /// The raw token for the authorization header
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Decoded expiry, `None` if the token carries none or is not a JWT
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is unusable at `now`
    ///
    /// A token without a readable expiry counts as expired, so it gets
    /// replaced by a fresh login.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp <= now,
            None => true,
        }
    }

    /// [`Token::is_expired_at`] against the current time
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("raw", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn decode_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let payload = raw.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(secs, 0)
}
