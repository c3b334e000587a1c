use core_sync::{ActionError, SyncError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Document generation failed: {0}")]
    Generation(String),

    #[error("Invalid export settings: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, ExportError>;

impl From<ExportError> for ActionError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(io) => ActionError::Io(io.to_string()),
            ExportError::Sync(sync) => sync.into(),
            other => ActionError::Generation(other.to_string()),
        }
    }
}
