// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bearer-token authentication for the gateway.
//!
//! Tokens are symmetric HS256 JWTs. Claims carry the principal id (`sub`),
//! the role list, and an expiry; verification produces the immutable
//! [`Principal`] that every downstream authorization decision trusts.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use agw_core::Principal;
use agw_error::AgentError;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claim set for gateway tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

/// Mint a signed bearer token for `principal`, valid for `ttl_minutes`.
pub fn mint_token(
    principal: &Principal,
    ttl_minutes: u64,
    secret: &str,
) -> Result<String, AgentError> {
    let exp = Utc::now() + Duration::minutes(ttl_minutes as i64);
    let claims = Claims {
        sub: principal.id.clone(),
        roles: principal.roles.iter().cloned().collect(),
        exp: exp.timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AgentError::internal(format!("failed to sign token: {e}")))
}

/// Verify a bearer token and extract the [`Principal`].
///
/// Signature, algorithm, and expiry are all enforced; any failure maps to
/// `Unauthenticated` without detail leakage.
pub fn verify_token(token: &str, secret: &str) -> Result<Principal, AgentError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AgentError::unauthenticated("invalid or expired token"))?;

    Ok(Principal::new(data.claims.sub, data.claims.roles))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_error::ErrorCode;

    const SECRET: &str = "unit-test-secret";

    fn principal() -> Principal {
        Principal::new("user-1", ["sales_agent"])
    }

    #[test]
    fn mint_then_verify_roundtrip() {
        let token = mint_token(&principal(), 60, SECRET).unwrap();
        let back = verify_token(&token, SECRET).unwrap();
        assert_eq!(back.id, "user-1");
        assert!(back.has_role("sales_agent"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = mint_token(&principal(), 60, SECRET).unwrap();
        let err = verify_token(&token, "other-secret").unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[test]
    fn expired_token_rejected() {
        // jsonwebtoken applies default leeway of 60s; expire well past it.
        let claims = Claims {
            sub: "user-1".into(),
            roles: vec![],
            exp: (Utc::now() - Duration::minutes(10)).timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_token(&token, SECRET).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(verify_token("not-a-jwt", SECRET).is_err());
        assert!(verify_token("", SECRET).is_err());
    }

    #[test]
    fn roles_default_to_empty() {
        let claims = Claims {
            sub: "user-2".into(),
            roles: vec![],
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let p = verify_token(&token, SECRET).unwrap();
        assert!(p.roles.is_empty());
    }
}
