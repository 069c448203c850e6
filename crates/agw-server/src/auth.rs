// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request authentication and the CSRF double-submit check.

use agw_core::Principal;
use agw_error::AgentError;
use axum::http::HeaderMap;

/// Extract and verify the bearer token, producing the [`Principal`].
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Principal, AgentError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AgentError::unauthenticated("missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| AgentError::unauthenticated("Authorization header is not a bearer token"))?;
    agw_auth::verify_token(token, secret)
}

/// Double-submit CSRF check for browser-origin requests.
///
/// Requests without an `Origin` header (service-to-service calls) pass.
/// Browser requests must carry an `X-CSRF-Token` header matching the
/// `csrf_token` cookie.
pub fn check_csrf(headers: &HeaderMap) -> Result<(), AgentError> {
    if headers.get("origin").is_none() {
        return Ok(());
    }
    let header_token = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AgentError::forbidden("missing CSRF token"))?;

    let cookie_token = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_csrf_cookie)
        .ok_or_else(|| AgentError::forbidden("missing CSRF cookie"))?;

    if header_token == cookie_token {
        Ok(())
    } else {
        Err(AgentError::forbidden("CSRF token mismatch"))
    }
}

fn extract_csrf_cookie(cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "csrf_token").then(|| value.to_string())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_error::ErrorCode;
    use axum::http::HeaderValue;

    const SECRET: &str = "server-test-secret";

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_bearer_token_authenticates() {
        let principal = Principal::new("u-1", ["sales_agent"]);
        let token = agw_auth::mint_token(&principal, 5, SECRET).unwrap();
        let back = authenticate(&headers_with_token(&token), SECRET).unwrap();
        assert_eq!(back.id, "u-1");
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let err = authenticate(&HeaderMap::new(), SECRET).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[test]
    fn non_bearer_scheme_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert!(authenticate(&headers, SECRET).is_err());
    }

    #[test]
    fn csrf_passes_without_origin() {
        assert!(check_csrf(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn csrf_requires_matching_pair_for_browser_origins() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://app.example.com"));
        assert_eq!(check_csrf(&headers).unwrap_err().code, ErrorCode::Forbidden);

        headers.insert("x-csrf-token", HeaderValue::from_static("tok-1"));
        headers.insert("cookie", HeaderValue::from_static("theme=dark; csrf_token=tok-1"));
        assert!(check_csrf(&headers).is_ok());

        headers.insert("x-csrf-token", HeaderValue::from_static("tok-2"));
        assert_eq!(check_csrf(&headers).unwrap_err().code, ErrorCode::Forbidden);
    }
}
