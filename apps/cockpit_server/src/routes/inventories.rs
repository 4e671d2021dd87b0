use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cockpit_engine::conditions;
use cockpit_model::{ConditionNode, InventoryScope};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "inventories", "read").await?;
    let inventories = state
        .ctx
        .store
        .inventories()
        .list_visible(&user.username)
        .await?;
    Ok(Json(json!({"inventories": inventories})))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    pub conditions: ConditionNode,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "inventories", "write").await?;
    let scope = if request.private {
        InventoryScope::Private
    } else {
        InventoryScope::Global
    };
    let inventory = state
        .ctx
        .store
        .inventories()
        .create(&request.name, scope, &user.username, &request.conditions)
        .await?;
    Ok(Json(serde_json::to_value(inventory).map_err(|err| ApiError::internal(err.to_string()))?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub conditions: ConditionNode,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "inventories", "write").await?;
    state
        .ctx
        .store
        .inventories()
        .update_conditions(id, &request.conditions)
        .await?;
    Ok(Json(json!({"updated": id})))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "inventories", "write").await?;
    state.ctx.store.inventories().delete(id).await?;
    Ok(Json(json!({"deleted": id})))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub conditions: ConditionNode,
}

/// Evaluate a condition tree against the live device set without saving
/// anything.
pub async fn preview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "inventories", "read").await?;
    let devices = state
        .ctx
        .nautobot
        .list_devices()
        .await
        .map_err(cockpit_engine::EngineError::from)?;
    let matched: Vec<Value> = conditions::filter_devices(&request.conditions, &devices)
        .into_iter()
        .map(|device| {
            json!({
                "id": device.get("id"),
                "name": device.get("name"),
            })
        })
        .collect();
    Ok(Json(json!({
        "total": devices.len(),
        "matched": matched.len(),
        "devices": matched,
    })))
}
