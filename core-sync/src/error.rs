use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No provider registered for {0}")]
    ProviderNotRegistered(String),

    #[error("Provider error: {0}")]
    Provider(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure of a single attempted action.
///
/// Every variant is eligible for retry; the message is what ends up in the
/// result log and the coordinator's last-error field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Upload rejected by {0}")]
    Rejected(String),

    #[error("Action timed out after {0}ms")]
    Timeout(u64),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("File generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<BridgeError> for ActionError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(io) => ActionError::Io(io.to_string()),
            other => ActionError::Provider(other.to_string()),
        }
    }
}

impl From<SyncError> for ActionError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Provider(bridge) => bridge.into(),
            other => ActionError::Provider(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::Serialization(err.to_string())
    }
}
