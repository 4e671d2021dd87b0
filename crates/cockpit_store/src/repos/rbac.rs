use crate::error::StoreError;
use cockpit_model::{Permission, Role};
use sqlx::{Row, SqlitePool};

pub struct RbacRepo<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RbacRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_role(&self, name: &str, description: &str) -> Result<Role, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO roles (name, description) VALUES (?1, ?2)")
            .bind(name)
            .bind(description)
            .execute(self.pool)
            .await?;
        let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = ?1")
            .bind(name)
            .fetch_one(self.pool)
            .await?;
        Ok(Role {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }

    pub async fn ensure_permission(
        &self,
        resource: &str,
        action: &str,
    ) -> Result<Permission, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO permissions (resource, action) VALUES (?1, ?2)")
            .bind(resource)
            .bind(action)
            .execute(self.pool)
            .await?;
        let row =
            sqlx::query("SELECT id, resource, action FROM permissions WHERE resource = ?1 AND action = ?2")
                .bind(resource)
                .bind(action)
                .fetch_one(self.pool)
                .await?;
        Ok(Permission {
            id: row.try_get("id")?,
            resource: row.try_get("resource")?,
            action: row.try_get("action")?,
        })
    }

    pub async fn grant(&self, role_id: i64, permission_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)")
            .bind(role_id)
            .bind(permission_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn revoke(&self, role_id: i64, permission_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?1 AND permission_id = ?2")
            .bind(role_id)
            .bind(permission_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(role_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn unassign_role(&self, user_id: i64, role_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?1 AND role_id = ?2")
            .bind(user_id)
            .bind(role_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn roles_for(&self, user_id: i64) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(
            "SELECT r.id, r.name, r.description FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = ?1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Role {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    /// Union of permissions over every role assigned to the user.
    pub async fn effective_permissions(&self, user_id: i64) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT p.id, p.resource, p.action FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN user_roles ur ON ur.role_id = rp.role_id \
             WHERE ur.user_id = ?1 ORDER BY p.resource, p.action",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Permission {
                    id: row.try_get("id")?,
                    resource: row.try_get("resource")?,
                    action: row.try_get("action")?,
                })
            })
            .collect()
    }

    pub async fn has_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN user_roles ur ON ur.role_id = rp.role_id \
             WHERE ur.user_id = ?1 AND p.resource = ?2 AND p.action = ?3",
        )
        .bind(user_id)
        .bind(resource)
        .bind(action)
        .fetch_one(self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    pub async fn role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        row.map(|row| {
            Ok(Role {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[tokio::test]
    async fn permission_follows_role_grant_exactly() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let user = store.users().create("ops", "", "", "h").await.unwrap();
        let role = store.rbac().ensure_role("operator", "runs jobs").await.unwrap();
        let permission = store.rbac().ensure_permission("jobs", "write").await.unwrap();

        // No role, no permission.
        assert!(!store
            .rbac()
            .has_permission(user.id, "jobs", "write")
            .await
            .unwrap());

        store.rbac().assign_role(user.id, role.id).await.unwrap();
        assert!(!store
            .rbac()
            .has_permission(user.id, "jobs", "write")
            .await
            .unwrap());

        store.rbac().grant(role.id, permission.id).await.unwrap();
        assert!(store
            .rbac()
            .has_permission(user.id, "jobs", "write")
            .await
            .unwrap());
        // The grant is (resource, action)-exact.
        assert!(!store
            .rbac()
            .has_permission(user.id, "jobs", "read")
            .await
            .unwrap());

        store.rbac().revoke(role.id, permission.id).await.unwrap();
        assert!(!store
            .rbac()
            .has_permission(user.id, "jobs", "write")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn seeded_admin_role_grants_everything() {
        let store = Store::connect_memory().await.unwrap();
        store.migrate().await.unwrap();

        let user = store.users().create("root", "", "", "h").await.unwrap();
        let admin = store.rbac().role_by_name("admin").await.unwrap().unwrap();
        store.rbac().assign_role(user.id, admin.id).await.unwrap();

        for (resource, action) in [("jobs", "write"), ("credentials", "write"), ("logs", "read")] {
            assert!(
                store
                    .rbac()
                    .has_permission(user.id, resource, action)
                    .await
                    .unwrap(),
                "admin missing {resource}:{action}"
            );
        }

        let viewer = store.rbac().role_by_name("viewer").await.unwrap().unwrap();
        let viewer_user = store.users().create("guest", "", "", "h").await.unwrap();
        store
            .rbac()
            .assign_role(viewer_user.id, viewer.id)
            .await
            .unwrap();
        assert!(store
            .rbac()
            .has_permission(viewer_user.id, "jobs", "read")
            .await
            .unwrap());
        assert!(!store
            .rbac()
            .has_permission(viewer_user.id, "jobs", "write")
            .await
            .unwrap());
    }
}
