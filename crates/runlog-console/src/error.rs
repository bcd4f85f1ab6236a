//! Error types for runlog-console

use runlog_core::{BackendError, ConsoleIdError};
use runlog_storage::StorageError;
use thiserror::Error;

/// Errors raised by console sessions and the lifecycle filter
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Console id error: {0}")]
    ConsoleId(#[from] ConsoleIdError),

    /// Job state could not be read
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A progress value outside `[0, 100]`
    #[error("Progress value {0} out of range 0..100")]
    InvalidProgress(f64),

    /// Job state data is missing or malformed
    #[error("Invalid job state: {0}")]
    InvalidState(String),
}

impl ConsoleError {
    /// Create a new InvalidState error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

/// Errors raised while loading or validating [`ConsoleOptions`](crate::ConsoleOptions)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid console options: {0}")]
    Invalid(String),

    #[error("Failed to parse console options: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read console options: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a new Invalid error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
