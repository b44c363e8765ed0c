use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a shared resource name is required")]
    EmptyName,

    #[error("failed to create or open [{name}]: {reason}")]
    Create { name: String, reason: String },

    #[error("release of [{name}] failed: {reason}")]
    Release { name: String, reason: String },

    #[error("[{0}] is not held by this handle")]
    NotOwner(String),

    #[error("settings store: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Settings(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
