//! Account handlers: register, login, logout, profile and token refresh.

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::auth::token::TokenKind;
use crate::auth::{AuthUser, issue_pair, password, token, unix_now};
use crate::error::ApiError;
use crate::model::Profile;
use crate::state::AppState;

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub(super) struct UpdateProfileRequest {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AuthResponse {
    id: String,
    name: String,
    email: String,
    access_token: String,
    refresh_token: String,
}

impl AuthResponse {
    fn new(state: &AppState, profile: Profile) -> Result<Self, ApiError> {
        let tokens = issue_pair(state, &profile.id)?;
        Ok(AuthResponse {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            access_token: tokens.access,
            refresh_token: tokens.refresh,
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    let email = req.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(ApiError::BadRequest("A valid email is required".into())),
    }
    if req.password.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Argon2 runs on the blocking pool.
async fn hash_password(pw: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || password::hash(&pw))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))?
        .map_err(ApiError::Internal)
}

async fn verify_password(pw: String, stored: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || password::verify(&pw, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST /api/auth/register
pub(super) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(req) = payload?;
    validate_registration(&req)?;

    let hash = hash_password(req.password).await?;
    let (name, email) = (req.name, req.email);
    let profile = state
        .store
        .run(move |s| s.create_profile(&name, &email, &hash))
        .await?;

    info!(user_id = %profile.id, "user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(&state, profile)?)))
}

/// POST /api/auth/login
pub(super) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let invalid = || ApiError::BadRequest("Invalid credentials".into());

    let email = req.email;
    let creds = state
        .store
        .run(move |s| s.credentials_by_email(&email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(req.password, creds.password_hash).await? {
        return Err(invalid());
    }

    let user_id = creds.user_id;
    let profile = state
        .store
        .run(move |s| s.profile_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::Internal("profile missing for credentials".into()))?;

    info!(user_id = %profile.id, "user logged in");
    Ok(Json(AuthResponse::new(&state, profile)?))
}

/// POST /api/auth/logout
///
/// Tokens are stateless, so logging out only revokes the refresh token when
/// the client sends one.  Always succeeds.
pub(super) async fn logout(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let req: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    if let Some(refresh) = req.refresh_token {
        let now = unix_now();
        match token::verify(&state.keys, &refresh, TokenKind::Refresh) {
            Ok(claims) => {
                let (jti, exp) = (claims.jti, claims.exp);
                state.store.run(move |s| s.revoke_token(&jti, exp, now)).await?;
                info!(user_id = %claims.sub, "refresh token revoked");
            }
            Err(e) => warn!(error = %e, "logout with unusable refresh token"),
        }
    }
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// GET /api/auth/me
pub(super) async fn me(user: AuthUser) -> Json<Profile> {
    Json(user.profile)
}

/// PUT /api/auth/me
pub(super) async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>, ApiError> {
    let Json(req) = payload?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    let id = user.profile.id;
    let profile = state
        .store
        .run(move |s| s.update_profile_name(&id, &req.name))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(profile))
}

/// POST /api/auth/refresh-token
pub(super) async fn refresh_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    let refresh = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Refresh token is required".into()))?;

    let invalid = || ApiError::Forbidden("Invalid refresh token".into());
    let claims = token::verify(&state.keys, refresh.trim(), TokenKind::Refresh).map_err(|_| invalid())?;

    let (jti, user_id) = (claims.jti, claims.sub.clone());
    let usable = state
        .store
        .run(move |s| Ok(!s.is_revoked(&jti)? && s.profile_by_id(&user_id)?.is_some()))
        .await?;
    if !usable {
        return Err(invalid());
    }

    let ttl = state.config.auth.access_ttl_minutes.saturating_mul(60);
    let access = token::issue(&state.keys, &claims.sub, TokenKind::Access, unix_now(), ttl)?;
    Ok(Json(json!({ "accessToken": access })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, email: &str, pw: &str) -> RegisterRequest {
        RegisterRequest { name: name.into(), email: email.into(), password: pw.into() }
    }

    #[test]
    fn registration_validation() {
        assert!(validate_registration(&req("Ann", "ann@example.com", "secret")).is_ok());
        assert!(validate_registration(&req(" ", "ann@example.com", "secret")).is_err());
        assert!(validate_registration(&req("Ann", "ann.example.com", "secret")).is_err());
        assert!(validate_registration(&req("Ann", "@example.com", "secret")).is_err());
        let short = validate_registration(&req("Ann", "ann@example.com", "12345")).unwrap_err();
        assert_eq!(short.to_string(), "Password must be at least 6 characters");
    }
}
