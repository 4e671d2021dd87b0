use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use cockpit_model::{AuditEvent, User};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// JWT claims: subject, user id, a permission bitset hint and expiry.
/// Authorization decisions always consult the store; the bitset is a
/// client-side hint only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    pub permissions: u64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn issue_token(state: &AppState, user: &User, permissions: u64) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        permissions,
        exp: Utc::now().timestamp() + state.config.token_ttl_secs as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.secret_key.as_bytes()),
    )
    .map_err(|err| ApiError::internal(format!("token encode: {err}")))
}

/// Decode and verify a bearer token. `allow_expired` keeps the signature
/// check but skips expiry, for the refresh flow.
pub fn verify_token(
    state: &AppState,
    token: &str,
    allow_expired: bool,
) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    if allow_expired {
        validation.validate_exp = false;
    }
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Could not validate credentials"))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn permission_bitset(state: &AppState, user_id: i64) -> Result<u64, ApiError> {
    let permissions = state.ctx.store.rbac().effective_permissions(user_id).await?;
    Ok(permissions
        .iter()
        .fold(0u64, |bits, p| bits | 1u64.checked_shl((p.id % 63) as u32).unwrap_or(0)))
}

fn token_response(state: &AppState, user: &User, token: String) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": state.config.token_ttl_secs,
        "user": {
            "id": user.id,
            "username": user.username,
            "display_name": user.display_name,
            "email": user.email,
        },
    })
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .ctx
        .store
        .users()
        .get_by_username(&request.username)
        .await?;

    let Some(user) = user.filter(|u| u.is_active) else {
        audit_login_failure(&state, &request.username, &headers).await;
        return Err(ApiError::unauthorized("Invalid username or password"));
    };
    if !cockpit_vault::verify_password(&request.password, &user.password_hash) {
        audit_login_failure(&state, &request.username, &headers).await;
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    state.ctx.store.users().touch_last_login(user.id).await?;
    let bits = permission_bitset(&state, user.id).await?;
    let token = issue_token(&state, &user, bits)?;

    let mut event = AuditEvent::new(&user.username, "login", "user logged in");
    event.user_id = Some(user.id);
    if let Some(ip) = client_ip(&headers) {
        event = event.ip(ip);
    }
    let _ = state.ctx.store.audit().append(&event).await;
    info!(username = user.username.as_str(), "login");

    Ok(Json(token_response(&state, &user, token)))
}

/// Refresh accepts an expired token as long as the signature verifies and
/// the account is still active.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let claims = verify_token(&state, &token, true)?;

    let user = state
        .ctx
        .store
        .users()
        .get(claims.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("User account inactive"))?;

    let bits = permission_bitset(&state, user.id).await?;
    let token = issue_token(&state, &user, bits)?;
    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(&user.username, "token_refresh", "access token refreshed"))
        .await;
    Ok(Json(token_response(&state, &user, token)))
}

pub async fn api_key_login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let api_key = headers
        .get("X-Api-Key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("API key required"))?;

    let user = state
        .ctx
        .store
        .users()
        .get_by_api_key(api_key)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

    let bits = permission_bitset(&state, user.id).await?;
    let token = issue_token(&state, &user, bits)?;
    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(&user.username, "api_key_login", "api key exchanged for token"))
        .await;
    Ok(Json(token_response(&state, &user, token)))
}

async fn audit_login_failure(state: &AppState, username: &str, headers: &HeaderMap) {
    let mut event = AuditEvent::new(username, "login_failed", "invalid credentials")
        .severity(cockpit_model::AuditSeverity::Warning);
    if let Some(ip) = client_ip(headers) {
        event = event.ip(ip);
    }
    let _ = state.ctx.store.audit().append(&event).await;
}

pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
}
