use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Extract the expiry timestamp embedded in a JWT's payload segment.
///
/// The client never verifies the signature (it has no secret); it only
/// reads the `exp` claim to decide when to renew. Returns `None` for
/// anything that is not a decodable three-segment token with a numeric
/// `exp`, which callers treat as "already expired".
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;

    let expiry = DateTime::from_timestamp(exp, 0);
    if expiry.is_none() {
        debug!(exp = %exp, "exp claim out of timestamp range");
    }
    expiry
}
