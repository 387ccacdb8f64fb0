use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] gist_sync::SyncError),
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Sync(gist_sync::SyncError::Conflict { .. }))
    }
}

impl From<gist_sync::RemoteError> for AppError {
    fn from(err: gist_sync::RemoteError) -> Self {
        AppError::Sync(err.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
