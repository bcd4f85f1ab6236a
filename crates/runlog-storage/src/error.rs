//! Error types for runlog-storage
//!
//! This module defines the error types used throughout the storage crate.

use runlog_core::{BackendError, CodecError, ConsoleId};
use thiserror::Error;

/// Errors that can occur in console storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A session with the same id is already buffered
    #[error("Console session already exists: {0}")]
    AlreadyExists(String),

    /// No buffered session with this id (never initialized or already flushed)
    #[error("Console session not found: {0}")]
    NotFound(String),

    /// The key-value backend failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A stored line could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A line cannot be stored as given
    #[error("Invalid console line: {0}")]
    InvalidLine(String),
}

impl StorageError {
    /// Create a new AlreadyExists error
    pub fn already_exists(id: &ConsoleId) -> Self {
        Self::AlreadyExists(id.to_string())
    }

    /// Create a new NotFound error
    pub fn not_found(id: &ConsoleId) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create a new InvalidLine error
    pub fn invalid_line(message: impl Into<String>) -> Self {
        Self::InvalidLine(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_not_found_error() {
        let id = ConsoleId::new("job-9", Utc::now()).unwrap();
        let err = StorageError::not_found(&id);
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(err.to_string().contains("job-9"));
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: StorageError = BackendError::commit("conflict").into();
        assert!(matches!(err, StorageError::Backend(BackendError::Commit(_))));
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: StorageError = CodecError::decode("bad json").into();
        assert!(matches!(err, StorageError::Codec(_)));
    }
}
