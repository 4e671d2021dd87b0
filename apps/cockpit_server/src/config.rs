use anyhow::{bail, Result};

/// Process configuration from the environment. `SECRET_KEY` is mandatory;
/// the process refuses to start without it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub secret_key: String,
    pub database_url: String,
    pub broker_url: String,
    pub result_url: String,
    pub listen_addr: String,
    pub token_ttl_secs: u64,
    pub rate_limit_per_minute: u32,
    pub initial_username: Option<String>,
    pub initial_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() {
            bail!("SECRET_KEY must be set and non-empty");
        }
        Ok(Self {
            secret_key,
            database_url: env_or("COCKPIT_DATABASE_URL", "sqlite://cockpit.db"),
            broker_url: env_or("COCKPIT_BROKER_URL", "redis://127.0.0.1:6379/0"),
            result_url: env_or("COCKPIT_RESULT_URL", "redis://127.0.0.1:6379/1"),
            listen_addr: env_or("COCKPIT_LISTEN_ADDR", "0.0.0.0:8000"),
            token_ttl_secs: env_or("COCKPIT_TOKEN_TTL_SECS", "3600").parse().unwrap_or(3600),
            rate_limit_per_minute: env_or("COCKPIT_RATE_LIMIT_PER_MINUTE", "120")
                .parse()
                .unwrap_or(120),
            initial_username: std::env::var("COCKPIT_INITIAL_USERNAME").ok(),
            initial_password: std::env::var("COCKPIT_INITIAL_PASSWORD").ok(),
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}
