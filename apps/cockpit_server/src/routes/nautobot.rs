use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cockpit_model::{AuditEvent, AuditSeverity};
use cockpit_nautobot::OffboardRequest;
use serde_json::{json, Value};
use tracing::warn;

/// Device listing proxied through the gateway with the entity cache in
/// front of the GraphQL query.
pub async fn devices(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "read").await?;

    if let Some(cache) = &state.ctx.nautobot_cache {
        if let Some(cached) = cache.get_list("devices").await {
            return Ok(Json(json!({"devices": cached, "cached": true})));
        }
    }

    let devices = state
        .ctx
        .nautobot
        .list_devices()
        .await
        .map_err(cockpit_engine::EngineError::from)?;
    let devices = Value::Array(devices);

    if let Some(cache) = &state.ctx.nautobot_cache {
        cache.put_list("devices", &devices).await;
    }
    Ok(Json(json!({"devices": devices, "cached": false})))
}

pub async fn offboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<OffboardRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "write").await?;

    let result = state
        .ctx
        .nautobot
        .offboard_device(&id, &request)
        .await
        .map_err(cockpit_engine::EngineError::from)?;

    if let Some(cache) = &state.ctx.nautobot_cache {
        cache.invalidate("devices", &id).await;
    }

    if let Some(hostname) = result.checkmk_host.as_deref() {
        if let Err(err) = state.ctx.checkmk.delete_host(hostname).await {
            warn!(hostname, "checkmk cleanup failed: {err}");
        }
    }

    let _ = state
        .ctx
        .store
        .audit()
        .append(
            &AuditEvent::new(&user.username, "device_offboarded", result.summary.clone())
                .severity(AuditSeverity::Warning)
                .resource("device", id.clone(), id.clone()),
        )
        .await;

    Ok(Json(serde_json::to_value(result).map_err(|err| ApiError::internal(err.to_string()))?))
}
