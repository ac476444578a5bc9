//! Session cookie carrying the signed token.

use std::time::Duration;

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};

pub const SESSION_COOKIE_NAME: &str = "Authorization";

/// Build an `HttpOnly` cookie that expires together with the token.
pub fn session_cookie(
    token: &str,
    ttl: Duration,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = ttl.as_secs();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("Authorization=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("Authorization=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// Value of the session cookie across all `Cookie` headers, if present and non-empty.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME).then(|| val.trim().to_string())
        })
        .find(|val| !val.is_empty())
}
