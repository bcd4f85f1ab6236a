//! Error types for runlog

use thiserror::Error;

/// Top-level error type for runlog core operations
#[derive(Debug, Error)]
pub enum RunlogError {
    #[error("Console id error: {0}")]
    ConsoleId(#[from] ConsoleIdError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors raised while building or parsing a [`ConsoleId`](crate::ConsoleId)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleIdError {
    #[error("Job id must not be empty")]
    EmptyJobId,

    #[error("Start timestamp out of range: {0} ms")]
    TimestampOutOfRange(i64),

    #[error("Malformed console id: {0}")]
    Malformed(String),
}

/// Errors raised by the line wire codec
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode line: {0}")]
    Encode(String),

    #[error("Failed to decode line: {0}")]
    Decode(String),
}

impl CodecError {
    /// Create a new Encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a new Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

/// Errors reported by a [`KeyValueBackend`](crate::KeyValueBackend)
#[derive(Debug, Error)]
pub enum BackendError {
    /// I/O or connection failure
    #[error("Backend I/O error: {0}")]
    Io(String),

    /// The transaction could not be committed
    #[error("Commit failed: {0}")]
    Commit(String),

    /// The backend does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Commit error
    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit(message.into())
    }

    /// Create a new Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection reset");
        let err: BackendError = io_err.into();
        assert!(matches!(err, BackendError::Io(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_top_level_wraps_sources() {
        let err: RunlogError = ConsoleIdError::EmptyJobId.into();
        assert!(matches!(err, RunlogError::ConsoleId(ConsoleIdError::EmptyJobId)));

        let err: RunlogError = CodecError::decode("truncated").into();
        assert!(err.to_string().contains("truncated"));
    }
}
