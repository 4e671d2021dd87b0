use crate::auth::{bearer_token, verify_token};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
}

/// Middleware chain: request-id injection, per-IP rate limit, then JWT or
/// API-key authentication.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    request.extensions_mut().insert(request_id);

    let headers = request.headers().clone();
    let client = client_key(&headers);
    if !state.limiter.check(&client) {
        return Err(ApiError::new(
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded",
        ));
    }

    let user = authenticate(&state, &headers).await?;
    request.extensions_mut().insert(user);

    let mut response = next.run(request).await;
    if let Ok(value) = request_id.to_string().parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_token(state, &token, false)?;
        return Ok(CurrentUser {
            user_id: claims.user_id,
            username: claims.sub,
        });
    }
    if let Some(api_key) = headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) {
        let user = state
            .ctx
            .store
            .users()
            .get_by_api_key(api_key)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;
        return Ok(CurrentUser {
            user_id: user.id,
            username: user.username,
        });
    }
    Err(ApiError::unauthorized("Not authenticated"))
}

/// The effective permission set is the union over the user's roles; the
/// check is an exact (resource, action) match against it.
pub async fn require_permission(
    state: &AppState,
    user: &CurrentUser,
    resource: &str,
    action: &str,
) -> Result<(), ApiError> {
    let allowed = state
        .ctx
        .store
        .rbac()
        .has_permission(user.user_id, resource, action)
        .await?;
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "Missing permission {resource}:{action}"
        )))
    }
}

fn client_key(headers: &HeaderMap) -> String {
    crate::auth::client_ip(headers).unwrap_or_else(|| "unknown".to_string())
}
