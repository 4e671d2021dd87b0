use crate::error::StoreError;
use chrono::Utc;
use cockpit_model::{ConditionNode, Inventory, InventoryScope};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct InventoryRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InventoryRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        scope: InventoryScope,
        created_by: &str,
        conditions: &ConditionNode,
    ) -> Result<Inventory, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO inventories (name, scope, created_by, conditions, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(name)
        .bind(scope_str(scope))
        .bind(created_by)
        .bind(serde_json::to_string(conditions).map_err(StoreError::decode)?)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("inventory '{}' already exists", name))
            }
            other => StoreError::Sqlx(other),
        })?;

        Ok(Inventory {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            scope,
            created_by: created_by.to_string(),
            conditions: conditions.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Resolve an inventory by name as seen by `username`: their private one
    /// first, then the global one.
    pub async fn resolve(
        &self,
        name: &str,
        username: &str,
    ) -> Result<Option<Inventory>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM inventories WHERE name = ?1 \
             AND (scope = 'global' OR created_by = ?2) \
             ORDER BY CASE scope WHEN 'private' THEN 0 ELSE 1 END LIMIT 1",
        )
        .bind(name)
        .bind(username)
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    pub async fn list_visible(&self, username: &str) -> Result<Vec<Inventory>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM inventories WHERE scope = 'global' OR created_by = ?1 ORDER BY name",
        )
        .bind(username)
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_inventory).collect()
    }

    pub async fn update_conditions(
        &self,
        id: i64,
        conditions: &ConditionNode,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE inventories SET conditions = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(serde_json::to_string(conditions).map_err(StoreError::decode)?)
                .bind(Utc::now())
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("inventory"));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventories WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("inventory"));
        }
        Ok(())
    }
}

fn scope_str(scope: InventoryScope) -> &'static str {
    match scope {
        InventoryScope::Global => "global",
        InventoryScope::Private => "private",
    }
}

fn row_to_inventory(row: &SqliteRow) -> Result<Inventory, StoreError> {
    let scope: String = row.try_get("scope")?;
    let conditions: String = row.try_get("conditions")?;
    Ok(Inventory {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        scope: match scope.as_str() {
            "private" => InventoryScope::Private,
            _ => InventoryScope::Global,
        },
        created_by: row.try_get("created_by")?,
        conditions: serde_json::from_str(&conditions).map_err(StoreError::decode)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
