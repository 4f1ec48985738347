use thiserror::Error;

pub type PulseResult<T> = Result<T, PulseError>;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sync already in progress for data source {0}")]
    SyncInProgress(uuid::Uuid),

    #[error("Event processing error: {0}")]
    Processing(String),

    #[error("Content provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PulseError {
    /// Whether this failure should move a data source to `needs_reauth`
    /// rather than plain `error`.
    pub fn is_auth(&self) -> bool {
        matches!(self, PulseError::Auth(_))
    }
}
