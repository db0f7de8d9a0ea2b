//! Error types for the Tuya integration

use ha_config_entries::SetupError;
use ha_core::JobError;
use thiserror::Error;

use crate::sharing::SharingError;

pub type TuyaResult<T> = Result<T, TuyaError>;

#[derive(Debug, Error)]
pub enum TuyaError {
    /// Entry was created by the legacy login and must be re-authenticated
    #[error("Authentication failed. Please re-authenticate.")]
    AuthRequired,

    #[error("invalid config entry {entry_id}: {source}")]
    InvalidEntry {
        entry_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load integration manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    #[error("failed to refresh device cache: {0}")]
    DeviceCache(#[source] SharingError),

    #[error("failed to start push channel: {0}")]
    PushChannel(#[source] SharingError),

    #[error("platform setup failed: {0}")]
    Platform(#[from] SetupError),

    #[error(transparent)]
    Executor(#[from] JobError),
}

impl From<TuyaError> for SetupError {
    fn from(err: TuyaError) -> Self {
        match err {
            // Re-login is the only way to repair missing credentials
            TuyaError::AuthRequired | TuyaError::InvalidEntry { .. } => {
                SetupError::AuthFailed(err.to_string())
            }
            TuyaError::Platform(inner) => inner,
            other => SetupError::NotReady(other.to_string()),
        }
    }
}
