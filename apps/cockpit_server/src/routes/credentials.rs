use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use cockpit_model::{AuditEvent, AuditSeverity, CredentialKind, CredentialRecord};
use cockpit_store::NewCredential;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

/// Credentials leave the API as metadata plus derived status; ciphertext
/// and plaintext never do.
fn view(record: &CredentialRecord) -> Value {
    json!({
        "id": record.id,
        "name": record.name,
        "source": record.source,
        "username": record.username,
        "kind": record.kind,
        "valid_until": record.valid_until,
        "is_active": record.is_active,
        "status": record.status(),
        "has_password": record.password_encrypted.is_some(),
        "has_ssh_key": record.ssh_key_encrypted.is_some(),
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "credentials", "read").await?;
    let records = state.ctx.store.credentials().list().await?;
    let visible: Vec<Value> = records
        .iter()
        .filter(|record| record.source == "general" || record.source == user.username)
        .map(view)
        .collect();
    Ok(Json(json!({"credentials": visible})))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub username: String,
    pub kind: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "credentials", "write").await?;

    let kind = CredentialKind::from_str(&request.kind).map_err(ApiError::bad_request)?;
    let source = if request.private {
        user.username.clone()
    } else {
        "general".to_string()
    };

    let record = state
        .ctx
        .store
        .credentials()
        .create(
            &state.ctx.vault,
            NewCredential {
                name: request.name,
                source,
                username: request.username,
                kind,
                password: request.password,
                ssh_key: request.ssh_key,
                passphrase: request.passphrase,
                valid_until: request.valid_until,
            },
        )
        .await?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(
            &AuditEvent::new(&user.username, "credential_created", format!("created credential '{}'", record.name))
                .severity(AuditSeverity::Warning)
                .resource("credential", record.id.to_string(), record.name.clone()),
        )
        .await;
    Ok(Json(view(&record)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "credentials", "read").await?;
    let record = state
        .ctx
        .store
        .credentials()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("credential not found"))?;
    if record.source != "general" && record.source != user.username {
        return Err(ApiError::not_found("credential not found"));
    }
    Ok(Json(view(&record)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub valid_until: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "credentials", "write").await?;
    let record = state
        .ctx
        .store
        .credentials()
        .update(
            &state.ctx.vault,
            id,
            request.username.as_deref(),
            request.password.as_deref(),
            request.valid_until,
            request.is_active,
        )
        .await?;

    let _ = state
        .ctx
        .store
        .audit()
        .append(
            &AuditEvent::new(&user.username, "credential_updated", format!("updated credential '{}'", record.name))
                .severity(AuditSeverity::Warning)
                .resource("credential", record.id.to_string(), record.name.clone()),
        )
        .await;
    Ok(Json(view(&record)))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "credentials", "write").await?;
    state.ctx.store.credentials().delete(id).await?;
    let _ = state
        .ctx
        .store
        .audit()
        .append(
            &AuditEvent::new(&user.username, "credential_deleted", format!("deleted credential {id}"))
                .severity(AuditSeverity::Warning)
                .resource("credential", id.to_string(), id.to_string()),
        )
        .await;
    Ok(Json(json!({"deleted": id})))
}
