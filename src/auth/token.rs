//! JWTs signed with the server's ed25519 key (`alg = EdDSA`).
//!
//! Two kinds are issued: short-lived access tokens carried on every request
//! and long-lived refresh tokens exchanged for new access tokens.  The kind
//! travels in the `typ` claim so one cannot stand in for the other.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::keys::SigningKeys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported algorithm")]
    Algorithm,
    #[error("bad signature")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
    #[error("token lifetime out of range")]
    Lifetime,
    #[error("cannot sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::Signature,
            ErrorKind::InvalidAlgorithm => TokenError::Algorithm,
            _ => TokenError::Malformed,
        }
    }
}

/// Issue a signed token for `user_id` valid for `ttl_secs` from `now`.
pub fn issue(
    keys: &SigningKeys,
    user_id: &str,
    kind: TokenKind,
    now: i64,
    ttl_secs: i64,
) -> Result<String, TokenError> {
    let exp = now.checked_add(ttl_secs).ok_or(TokenError::Lifetime)?;
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(keys.key_id.clone());
    let claims = Claims {
        sub: user_id.to_string(),
        typ: kind,
        iat: now,
        exp,
        jti: Uuid::new_v4().to_string(),
    };
    jsonwebtoken::encode(&header, &claims, keys.encoding_key())
        .map_err(|e| TokenError::Signing(e.to_string()))
}

/// Check signature, expiry and kind; return the claims.
pub fn verify(keys: &SigningKeys, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let claims = jsonwebtoken::decode::<Claims>(token, keys.decoding_key(), &validation)?.claims;
    if claims.typ != expected {
        return Err(TokenError::WrongKind);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::unix_now;

    // {"alg":"HS256","typ":"JWT"}
    const HS256_HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

    fn keys() -> SigningKeys {
        SigningKeys::generate().unwrap()
    }

    #[test]
    fn issued_token_verifies() {
        let keys = keys();
        let now = unix_now();
        let token = issue(&keys, "user-1", TokenKind::Access, now, 900).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = verify(&keys, &token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp, now + 900);
    }

    #[test]
    fn header_carries_key_id() {
        let keys = keys();
        let token = issue(&keys, "u", TokenKind::Access, unix_now(), 60).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some(keys.key_id.as_str()));
    }

    #[test]
    fn expired_token_rejected() {
        let keys = keys();
        let token = issue(&keys, "u", TokenKind::Access, unix_now() - 120, 60).unwrap();
        assert_eq!(verify(&keys, &token, TokenKind::Access), Err(TokenError::Expired));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let keys = keys();
        let token = issue(&keys, "u", TokenKind::Refresh, unix_now(), 60).unwrap();
        assert_eq!(verify(&keys, &token, TokenKind::Access), Err(TokenError::WrongKind));
        assert!(verify(&keys, &token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn foreign_key_or_tampering_rejected() {
        let keys = keys();
        let other = self::keys();
        let now = unix_now();
        let token = issue(&keys, "u", TokenKind::Access, now, 60).unwrap();
        assert_eq!(verify(&other, &token, TokenKind::Access), Err(TokenError::Signature));

        // Claims lifted from a token for another user keep the original signature.
        let admin = issue(&other, "admin", TokenKind::Access, now, 60).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = admin.split('.').nth(1).unwrap();
        assert_eq!(verify(&keys, &parts.join("."), TokenKind::Access), Err(TokenError::Signature));
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = keys();
        assert_eq!(verify(&keys, "abc", TokenKind::Access), Err(TokenError::Malformed));
        assert_eq!(verify(&keys, "a.b.c.d", TokenKind::Access), Err(TokenError::Malformed));
    }

    #[test]
    fn other_algorithms_rejected() {
        let keys = keys();
        let token = issue(&keys, "u", TokenKind::Access, unix_now(), 60).unwrap();
        let claims = token.split('.').nth(1).unwrap();
        let forged = format!("{HS256_HEADER}.{claims}.");
        assert_eq!(verify(&keys, &forged, TokenKind::Access), Err(TokenError::Algorithm));
    }

    #[test]
    fn lifetime_overflow_is_an_error() {
        let keys = keys();
        assert_eq!(
            issue(&keys, "u", TokenKind::Refresh, unix_now(), i64::MAX),
            Err(TokenError::Lifetime)
        );
    }
}
