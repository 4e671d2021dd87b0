use crate::error::StoreError;
use chrono::{DateTime, Utc};
use cockpit_model::{AuditEvent, AuditSeverity};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct AuditRepo<'a> {
    pool: &'a SqlitePool,
}

#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub severity: Option<AuditSeverity>,
    pub event_type: Option<String>,
    pub username: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug)]
pub struct AuditPage {
    pub items: Vec<AuditEvent>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<'a> AuditRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Single-row append. The log is never updated or deleted from here.
    pub async fn append(&self, event: &AuditEvent) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO audit_logs (username, user_id, event_type, message, ip, resource_type, \
             resource_id, resource_name, severity, extra_data, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&event.username)
        .bind(event.user_id)
        .bind(&event.event_type)
        .bind(&event.message)
        .bind(&event.ip)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.resource_name)
        .bind(event.severity.as_str())
        .bind(event.extra_data.to_string())
        .bind(event.created_at)
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self, filter: &AuditFilter) -> Result<AuditPage, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(severity) = filter.severity {
            conditions.push(format!("severity = ?{}", binds.len() + 1));
            binds.push(severity.as_str().to_string());
        }
        if let Some(event_type) = &filter.event_type {
            conditions.push(format!("event_type = ?{}", binds.len() + 1));
            binds.push(event_type.clone());
        }
        if let Some(username) = &filter.username {
            conditions.push(format!("username = ?{}", binds.len() + 1));
            binds.push(username.clone());
        }
        if let Some(start) = filter.start_date {
            conditions.push(format!("created_at >= ?{}", binds.len() + 1));
            binds.push(start.to_rfc3339());
        }
        if let Some(end) = filter.end_date {
            conditions.push(format!("created_at <= ?{}", binds.len() + 1));
            binds.push(end.to_rfc3339());
        }
        if let Some(search) = &filter.search {
            conditions.push(format!("message LIKE ?{}", binds.len() + 1));
            binds.push(format!("%{}%", search));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS n FROM audit_logs{where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(self.pool).await?.try_get("n")?;

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 500);
        let offset = (page - 1) as i64 * page_size as i64;
        let list_sql = format!(
            "SELECT * FROM audit_logs{where_clause} ORDER BY created_at DESC LIMIT {page_size} OFFSET {offset}"
        );
        let mut list_query = sqlx::query(&list_sql);
        for bind in &binds {
            list_query = list_query.bind(bind);
        }
        let rows = list_query.fetch_all(self.pool).await?;
        let items = rows.iter().map(row_to_event).collect::<Result<_, _>>()?;

        Ok(AuditPage {
            items,
            total,
            page,
            page_size,
        })
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, StoreError> {
    let severity: String = row.try_get("severity")?;
    let extra_data: String = row.try_get("extra_data")?;
    Ok(AuditEvent {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        user_id: row.try_get("user_id")?,
        event_type: row.try_get("event_type")?,
        message: row.try_get("message")?,
        ip: row.try_get("ip")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        resource_name: row.try_get("resource_name")?,
        severity: AuditSeverity::from_str(&severity).map_err(StoreError::decode)?,
        extra_data: serde_json::from_str(&extra_data).map_err(StoreError::decode)?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn filters_and_paging() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        for i in 0..5 {
            store
                .audit()
                .append(&AuditEvent::new("admin", "login", format!("login #{i}")))
                .await
                .unwrap();
        }
        store
            .audit()
            .append(
                &AuditEvent::new("jdoe", "credential_created", "created credential lab")
                    .severity(AuditSeverity::Warning),
            )
            .await
            .unwrap();

        let all = store.audit().list(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.total, 6);

        let warnings = store
            .audit()
            .list(&AuditFilter {
                severity: Some(AuditSeverity::Warning),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(warnings.total, 1);
        assert_eq!(warnings.items[0].username, "jdoe");

        let search = store
            .audit()
            .list(&AuditFilter {
                search: Some("#3".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 1);

        let paged = store
            .audit()
            .list(&AuditFilter {
                username: Some("admin".into()),
                page: 2,
                page_size: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total, 5);
        assert_eq!(paged.items.len(), 2);
    }
}
