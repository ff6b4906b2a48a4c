//! Cookie parsing and `Set-Cookie` construction.

use axum::http::header;

/// Cookie carrying the bearer token for browser-native requests.
pub const TOKEN_COOKIE_NAME: &str = "token";

/// Short-lived cookie binding an OAuth `state` value to the browser that
/// started the handoff.
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

/// Lifetime of the OAuth state cookie: 10 minutes.
pub const OAUTH_STATE_MAX_AGE_SECS: u64 = 10 * 60;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

fn secure_attr(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// `Set-Cookie` value delivering a freshly minted token.
pub fn token_cookie(token: &str, max_age: u64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        TOKEN_COOKIE_NAME,
        token,
        max_age,
        secure_attr(secure)
    )
}

/// `Set-Cookie` value that removes the token cookie.
pub fn clear_token_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        TOKEN_COOKIE_NAME,
        secure_attr(secure)
    )
}

/// The state cookie must survive the provider's cross-site redirect back to
/// us, so it is `SameSite=Lax` rather than `Strict`.
pub fn oauth_state_cookie(state: &str, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        OAUTH_STATE_COOKIE_NAME,
        state,
        OAUTH_STATE_MAX_AGE_SECS,
        secure_attr(secure)
    )
}

pub fn clear_oauth_state_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
        OAUTH_STATE_COOKIE_NAME,
        secure_attr(secure)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token=abc123"));

        assert_eq!(get_cookie(&headers, "token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; token=abc123; oauth_state=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "oauth_state"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "token"), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(get_cookie(&headers, "token"), None);
    }

    #[test]
    fn test_token_cookie_attributes() {
        let cookie = token_cookie("abc", 604800, false);
        assert_eq!(
            cookie,
            "token=abc; HttpOnly; SameSite=Strict; Path=/; Max-Age=604800"
        );

        let cookie = token_cookie("abc", 604800, true);
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_clear_cookies_expire_immediately() {
        assert!(clear_token_cookie(false).contains("Max-Age=0"));
        assert!(clear_oauth_state_cookie(true).contains("Max-Age=0; Secure"));
        assert!(oauth_state_cookie("s", false).contains("SameSite=Lax"));
    }
}
