use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cockpit_engine::JobDispatcher;
use cockpit_model::{AuditEvent, InventorySource, JobType};
use cockpit_store::NewTemplate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub template_id: i64,
    #[serde(default)]
    pub parameters: Option<Value>,
}

pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "write").await?;

    let dispatcher = JobDispatcher::new(state.ctx.clone());
    let run = dispatcher
        .start_run(request.template_id, &user.username, request.parameters)
        .await?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(
            &AuditEvent::new(&user.username, "job_started", format!("started run {}", run.id))
                .resource("job_run", run.id.to_string(), run.job_type.as_str()),
        )
        .await;

    Ok(Json(json!({"run_id": run.id, "status": run.status, "total": run.progress.total})))
}

pub async fn recent(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "read").await?;
    let runs = state.ctx.store.runs().recent(100).await?;
    Ok(Json(json!({"runs": runs})))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "read").await?;
    let run = state
        .ctx
        .store
        .runs()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job run not found"))?;
    Ok(Json(serde_json::to_value(run).map_err(|err| ApiError::internal(err.to_string()))?))
}

pub async fn results(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "read").await?;
    let results = state.ctx.store.device_results().list_by_run(id).await?;
    Ok(Json(json!({"run_id": id, "results": results})))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "write").await?;
    let dispatcher = JobDispatcher::new(state.ctx.clone());
    dispatcher.cancel_run(id).await?;
    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(&user.username, "job_cancelled", format!("cancelled run {id}")))
        .await;
    Ok(Json(json!({"run_id": id, "cancelled": true})))
}

#[derive(Debug, Deserialize)]
pub struct Nb2CmkStartRequest {
    #[serde(default)]
    pub apply: bool,
}

/// Reconciliation is a background job; this returns immediately and the
/// job is observed via the polling endpoints.
pub async fn nb2cmk_start(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<Nb2CmkStartRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "write").await?;

    if let Some(active) = state.ctx.store.nb2cmk().active_job().await? {
        return Err(ApiError::new(
            axum::http::StatusCode::CONFLICT,
            format!("reconciliation {} is already running", active.job_id),
        ));
    }

    let job_id = Uuid::new_v4();
    state
        .ctx
        .store
        .nb2cmk()
        .create_job(job_id, &user.username, 0)
        .await?;
    state
        .ctx
        .queue
        .publish(
            "nb2cmk_run",
            json!({"job_id": job_id, "apply": request.apply}),
            None,
        )
        .await
        .map_err(cockpit_engine::EngineError::from)?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(&AuditEvent::new(
            &user.username,
            "checkmk_sync",
            format!("started reconciliation {job_id} (apply={})", request.apply),
        ))
        .await;
    Ok(Json(json!({"job_id": job_id, "status": "pending"})))
}

pub async fn nb2cmk_active(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "read").await?;
    let active = state.ctx.store.nb2cmk().active_job().await?;
    Ok(Json(json!({"job": active})))
}

pub async fn nb2cmk_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "read").await?;
    let job = state
        .ctx
        .store
        .nb2cmk()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("reconciliation job not found"))?;
    Ok(Json(serde_json::to_value(job).map_err(|err| ApiError::internal(err.to_string()))?))
}

pub async fn nb2cmk_results(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "devices", "read").await?;
    let results = state.ctx.store.nb2cmk().results(id).await?;
    Ok(Json(json!({"job_id": id, "results": results})))
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub job_type: String,
    #[serde(default)]
    pub inventory_source: Option<String>,
    #[serde(default)]
    pub inventory_name: Option<String>,
    #[serde(default)]
    pub credential_id: Option<i64>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub no_overlap: bool,
    #[serde(default)]
    pub config: Value,
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "write").await?;

    let job_type = JobType::from_str(&request.job_type).map_err(ApiError::bad_request)?;
    let inventory_source = match request.inventory_source.as_deref() {
        Some("inventory") => InventorySource::Inventory,
        _ => InventorySource::All,
    };
    let config = if request.config.is_null() {
        json!({})
    } else {
        request.config
    };

    let template = state
        .ctx
        .store
        .templates()
        .create(NewTemplate {
            name: request.name,
            job_type,
            inventory_source,
            inventory_name: request.inventory_name,
            credential_id: request.credential_id,
            is_global: request.is_global,
            no_overlap: request.no_overlap,
            config,
            created_by: user.username.clone(),
        })
        .await?;
    Ok(Json(serde_json::to_value(template).map_err(|err| ApiError::internal(err.to_string()))?))
}

pub async fn list_templates(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "read").await?;
    let templates = state.ctx.store.templates().list_visible(&user.username).await?;
    Ok(Json(json!({"templates": templates})))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "jobs", "write").await?;
    state.ctx.store.templates().delete(id).await?;
    Ok(Json(json!({"deleted": id})))
}

