use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures talking to the remote container backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("rate limited by remote")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode remote response: {0}")]
    Decode(String),
    #[error("access token rejected by remote (status {0})")]
    InvalidToken(u16),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::RateLimited { .. } | RemoteError::Transport(_) => true,
            RemoteError::Http { status, .. } => *status >= 500,
            RemoteError::Decode(_) | RemoteError::InvalidToken(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Http { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "remote manifest changed at {remote} after local snapshot {local}; \
         still conflicting after {attempts} merge attempts. \
         Pull first and push again, or push with --force to overwrite the remote"
    )]
    Conflict {
        local: DateTime<Utc>,
        remote: DateTime<Utc>,
        attempts: u32,
    },
    #[error("token error: {0}")]
    Token(String),
    #[error("manifest error: {0}")]
    Manifest(String),
    #[error("invalid export bundle: {0}")]
    InvalidBundle(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
