//! Authentication: signing keys, tokens, passwords and the request extractor.
//!
//! Protected handlers take an [`AuthUser`] argument; axum runs the extractor
//! before the handler and short-circuits with a 401 when the bearer token is
//! missing, invalid, expired, or names a user that no longer exists.

pub mod keys;
pub mod password;
pub mod token;

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::error::ApiError;
use crate::model::Profile;
use crate::state::AppState;

use token::{TokenError, TokenKind};

/// Current time in unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Access + refresh token pair for a freshly authenticated user.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn issue_pair(state: &AppState, user_id: &str) -> Result<TokenPair, TokenError> {
    let now = unix_now();
    let auth = &state.config.auth;
    let access_ttl = auth.access_ttl_minutes.checked_mul(60).ok_or(TokenError::Lifetime)?;
    let refresh_ttl = auth.refresh_ttl_days.checked_mul(24 * 60 * 60).ok_or(TokenError::Lifetime)?;
    Ok(TokenPair {
        access: token::issue(&state.keys, user_id, TokenKind::Access, now, access_ttl)?,
        refresh: token::issue(&state.keys, user_id, TokenKind::Refresh, now, refresh_ttl)?,
    })
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub profile: Profile,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.profile.id
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
fn bearer(value: Option<&str>) -> Option<&str> {
    value?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let token = bearer(header)
            .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".into()))?;

        let claims = token::verify(&state.keys, token, TokenKind::Access).map_err(
            |e| match e {
                TokenError::Expired => ApiError::Unauthorized("Token expired".into()),
                _ => ApiError::Unauthorized("Invalid token".into()),
            },
        )?;

        let user_id = claims.sub;
        let profile = state
            .store
            .run(move |s| s.profile_by_id(&user_id))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

        Ok(AuthUser { profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer(Some("Bearer   abc  ")), Some("abc"));
        assert_eq!(bearer(Some("Bearer ")), None);
        assert_eq!(bearer(Some("Basic abc")), None);
        assert_eq!(bearer(None), None);
    }
}
