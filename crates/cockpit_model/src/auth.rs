use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub is_active: bool,
    /// PBKDF2-SHA256 hash in PHC string format; never serialised to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("is_active", &self.is_active)
            .field("password_hash", &"******")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A grant of `action` on `resource`. Both are free-form strings matched
/// exactly by the RBAC check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    pub id: i64,
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_debug_redacts_hash() {
        let user = User {
            id: 1,
            username: "admin".into(),
            display_name: "Admin".into(),
            email: "admin@example.net".into(),
            is_active: true,
            password_hash: "pbkdf2-sha256$...".into(),
            last_login: None,
            created_at: Utc::now(),
        };
        let rendered = format!("{:?}", user);
        assert!(rendered.contains("******"));
        assert!(!rendered.contains("pbkdf2-sha256$"));
    }

    #[test]
    fn permission_matching_is_exact() {
        let p = Permission {
            id: 1,
            resource: "jobs".into(),
            action: "write".into(),
        };
        assert!(p.matches("jobs", "write"));
        assert!(!p.matches("jobs", "read"));
        assert!(!p.matches("credentials", "write"));
    }
}
