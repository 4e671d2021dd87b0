//! Declarative schema. The migration runner reconciles the live database
//! against these definitions on every boot: missing tables are created,
//! missing columns added. Nothing is ever dropped here; destructive changes
//! go through versioned migrations only.

pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
    pub default: Option<&'static str>,
}

pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub constraints: &'static [&'static str],
}

impl TableSpec {
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(column_def).collect();
        parts.extend(self.constraints.iter().map(|c| c.to_string()));
        format!("CREATE TABLE {} ({})", self.name, parts.join(", "))
    }
}

pub fn column_def(col: &ColumnSpec) -> String {
    let mut def = format!("{} {}", col.name, col.sql_type);
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = col.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}

/// Column clause for ALTER TABLE ADD COLUMN. SQLite refuses NOT NULL
/// additions without a default on populated tables, so the constraint is
/// kept only when a default accompanies it.
pub fn add_column_def(col: &ColumnSpec) -> String {
    let mut def = format!("{} {}", col.name, col.sql_type);
    match (col.nullable, col.default) {
        (false, Some(default)) => {
            def.push_str(" NOT NULL DEFAULT ");
            def.push_str(default);
        }
        (_, Some(default)) => {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        _ => {}
    }
    def
}

macro_rules! col {
    ($name:literal, $ty:literal) => {
        ColumnSpec {
            name: $name,
            sql_type: $ty,
            nullable: false,
            default: None,
        }
    };
    ($name:literal, $ty:literal, nullable) => {
        ColumnSpec {
            name: $name,
            sql_type: $ty,
            nullable: true,
            default: None,
        }
    };
    ($name:literal, $ty:literal, default = $default:literal) => {
        ColumnSpec {
            name: $name,
            sql_type: $ty,
            nullable: false,
            default: Some($default),
        }
    };
}

pub const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "users",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("username", "TEXT"),
            col!("display_name", "TEXT", default = "''"),
            col!("email", "TEXT", default = "''"),
            col!("is_active", "INTEGER", default = "1"),
            col!("password_hash", "TEXT"),
            col!("last_login", "TEXT", nullable),
            col!("created_at", "TEXT"),
        ],
        constraints: &["UNIQUE (username)"],
    },
    TableSpec {
        name: "user_profiles",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("user_id", "INTEGER"),
            col!("api_key", "TEXT", nullable),
        ],
        constraints: &[
            "UNIQUE (user_id)",
            "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE",
        ],
    },
    TableSpec {
        name: "roles",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("name", "TEXT"),
            col!("description", "TEXT", default = "''"),
        ],
        constraints: &["UNIQUE (name)"],
    },
    TableSpec {
        name: "permissions",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("resource", "TEXT"),
            col!("action", "TEXT"),
        ],
        constraints: &["UNIQUE (resource, action)"],
    },
    TableSpec {
        name: "role_permissions",
        columns: &[
            col!("role_id", "INTEGER"),
            col!("permission_id", "INTEGER"),
        ],
        constraints: &[
            "PRIMARY KEY (role_id, permission_id)",
            "FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE",
            "FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE",
        ],
    },
    TableSpec {
        name: "user_roles",
        columns: &[col!("user_id", "INTEGER"), col!("role_id", "INTEGER")],
        constraints: &[
            "PRIMARY KEY (user_id, role_id)",
            "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE",
            "FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE",
        ],
    },
    TableSpec {
        name: "credentials",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("name", "TEXT"),
            col!("source", "TEXT", default = "'general'"),
            col!("username", "TEXT"),
            col!("kind", "TEXT"),
            col!("password_encrypted", "TEXT", nullable),
            col!("ssh_key_encrypted", "TEXT", nullable),
            col!("passphrase_encrypted", "TEXT", nullable),
            col!("valid_until", "TEXT", nullable),
            col!("is_active", "INTEGER", default = "1"),
            col!("created_at", "TEXT"),
            col!("updated_at", "TEXT"),
        ],
        constraints: &["UNIQUE (name, source)"],
    },
    TableSpec {
        name: "git_repositories",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("name", "TEXT"),
            col!("url", "TEXT"),
            col!("branch", "TEXT", default = "'main'"),
            col!("category", "TEXT"),
            col!("credential_name", "TEXT", nullable),
            col!("auth_type", "TEXT", default = "'none'"),
            col!("verify_ssl", "INTEGER", default = "1"),
            col!("path", "TEXT"),
            col!("active", "INTEGER", default = "1"),
        ],
        constraints: &["UNIQUE (name)"],
    },
    TableSpec {
        name: "job_templates",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("name", "TEXT"),
            col!("job_type", "TEXT"),
            col!("inventory_source", "TEXT", default = "'all'"),
            col!("inventory_name", "TEXT", nullable),
            col!("credential_id", "INTEGER", nullable),
            col!("is_global", "INTEGER", default = "0"),
            col!("no_overlap", "INTEGER", default = "0"),
            col!("config", "TEXT", default = "'{}'"),
            col!("created_by", "TEXT"),
            col!("created_at", "TEXT"),
            col!("updated_at", "TEXT"),
        ],
        constraints: &["UNIQUE (name)"],
    },
    TableSpec {
        name: "job_schedules",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("template_id", "INTEGER"),
            col!("cron", "TEXT"),
            col!("enabled", "INTEGER", default = "1"),
            col!("credential_id", "INTEGER", nullable),
            col!("created_at", "TEXT"),
        ],
        constraints: &["FOREIGN KEY (template_id) REFERENCES job_templates(id) ON DELETE CASCADE"],
    },
    TableSpec {
        name: "job_runs",
        columns: &[
            col!("id", "TEXT PRIMARY KEY"),
            col!("template_id", "INTEGER", nullable),
            col!("job_type", "TEXT"),
            col!("status", "TEXT", default = "'pending'"),
            col!("started_by", "TEXT"),
            col!("started_at", "TEXT"),
            col!("completed_at", "TEXT", nullable),
            col!("processed", "INTEGER", default = "0"),
            col!("total", "INTEGER", default = "0"),
            col!("result_summary", "TEXT", nullable),
            col!("error", "TEXT", nullable),
            col!("metadata", "TEXT", default = "'null'"),
        ],
        constraints: &[],
    },
    TableSpec {
        name: "device_results",
        columns: &[
            col!("run_id", "TEXT"),
            col!("device_name", "TEXT"),
            col!("device_id", "TEXT", nullable),
            col!("status", "TEXT"),
            col!("result", "TEXT", default = "'null'"),
            col!("error_message", "TEXT", nullable),
            col!("processed_at", "TEXT"),
        ],
        constraints: &[
            "PRIMARY KEY (run_id, device_name)",
            "FOREIGN KEY (run_id) REFERENCES job_runs(id) ON DELETE CASCADE",
        ],
    },
    TableSpec {
        name: "inventories",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("name", "TEXT"),
            col!("scope", "TEXT", default = "'global'"),
            col!("created_by", "TEXT"),
            col!("conditions", "TEXT"),
            col!("created_at", "TEXT"),
            col!("updated_at", "TEXT"),
        ],
        constraints: &["UNIQUE (name, scope, created_by)"],
    },
    TableSpec {
        name: "settings",
        columns: &[
            col!("key", "TEXT PRIMARY KEY"),
            col!("value", "TEXT"),
            col!("updated_at", "TEXT"),
        ],
        constraints: &[],
    },
    TableSpec {
        name: "nb2cmk_jobs",
        columns: &[
            col!("job_id", "TEXT PRIMARY KEY"),
            col!("status", "TEXT", default = "'pending'"),
            col!("started_by", "TEXT"),
            col!("progress_current", "INTEGER", default = "0"),
            col!("progress_total", "INTEGER", default = "0"),
            col!("created_at", "TEXT"),
            col!("completed_at", "TEXT", nullable),
            col!("error", "TEXT", nullable),
        ],
        constraints: &[],
    },
    TableSpec {
        name: "nb2cmk_job_results",
        columns: &[
            col!("job_id", "TEXT"),
            col!("device_name", "TEXT"),
            col!("outcome", "TEXT"),
            col!("detail", "TEXT", default = "'null'"),
            col!("processed_at", "TEXT"),
        ],
        constraints: &[
            "PRIMARY KEY (job_id, device_name)",
            "FOREIGN KEY (job_id) REFERENCES nb2cmk_jobs(job_id) ON DELETE CASCADE",
        ],
    },
    TableSpec {
        name: "audit_logs",
        columns: &[
            col!("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col!("username", "TEXT"),
            col!("user_id", "INTEGER", nullable),
            col!("event_type", "TEXT"),
            col!("message", "TEXT"),
            col!("ip", "TEXT", nullable),
            col!("resource_type", "TEXT", nullable),
            col!("resource_id", "TEXT", nullable),
            col!("resource_name", "TEXT", nullable),
            col!("severity", "TEXT", default = "'info'"),
            col!("extra_data", "TEXT", default = "'null'"),
            col!("created_at", "TEXT"),
        ],
        constraints: &[],
    },
    TableSpec {
        name: "agent_commands",
        columns: &[
            col!("agent_id", "TEXT"),
            col!("command_id", "TEXT PRIMARY KEY"),
            col!("command", "TEXT"),
            col!("params", "TEXT", default = "'{}'"),
            col!("status", "TEXT", default = "'pending'"),
            col!("output", "TEXT", nullable),
            col!("error", "TEXT", nullable),
            col!("execution_time_ms", "INTEGER", nullable),
            col!("sent_at", "TEXT"),
            col!("completed_at", "TEXT", nullable),
            col!("sent_by", "TEXT"),
        ],
        constraints: &[],
    },
];
