use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("job run {0} is in a terminal state")]
    TerminalRun(Uuid),

    #[error("invalid progress update for run {run}: processed {processed} (total {total})")]
    InvalidProgress {
        run: Uuid,
        processed: u32,
        total: u32,
    },

    #[error("stored value failed to decode: {0}")]
    Decode(String),

    #[error(transparent)]
    Vault(#[from] cockpit_vault::VaultError),

    #[error("migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        StoreError::Decode(err.to_string())
    }
}
