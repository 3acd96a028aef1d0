//! Unverified JWT claim inspection
//!
//! Access tokens embed their expiry as the `exp` claim. The client never
//! trusts it for authorization (the backend decides, and expiry is found via
//! 401), but reading it lets `whoami` show how long a session has left.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::{Error, Result};

/// Decode the payload segment of a JWT into JSON without verifying it.
pub fn decode_unverified(token: &str) -> Result<serde_json::Value> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Claims("token is not a three-part JWT".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Claims(format!("invalid base64url payload: {e}")))?;

    serde_json::from_slice(&bytes).map_err(|e| Error::Claims(format!("invalid payload JSON: {e}")))
}

/// Expiry of an access token as unix seconds.
pub fn expires_at(token: &str) -> Result<u64> {
    let claims = decode_unverified(token)?;
    let exp = claims
        .get("exp")
        .ok_or_else(|| Error::Claims("token has no exp claim".into()))?;

    exp.as_u64()
        .or_else(|| exp.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| Error::Claims(format!("exp claim is not a timestamp: {exp}")))
}

/// Seconds until expiry relative to `now_secs`; zero once expired.
pub fn remaining_secs(token: &str, now_secs: u64) -> Result<u64> {
    Ok(expires_at(token)?.saturating_sub(now_secs))
}
