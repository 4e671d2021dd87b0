use crate::error::ApiError;
use crate::rbac::{require_permission, CurrentUser};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use cockpit_model::AuditSeverity;
use cockpit_store::AuditFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub search: Option<String>,
}

/// The audit trail is read-only from the API.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &user, "logs", "read").await?;

    let severity = query
        .severity
        .as_deref()
        .map(AuditSeverity::from_str)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let page = state
        .ctx
        .store
        .audit()
        .list(&AuditFilter {
            severity,
            event_type: query.event_type,
            username: query.username,
            start_date: query.start_date,
            end_date: query.end_date,
            search: query.search,
            page: query.page.unwrap_or(1),
            page_size: query.page_size.unwrap_or(50),
        })
        .await?;

    Ok(Json(json!({
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "page_size": page.page_size,
    })))
}
