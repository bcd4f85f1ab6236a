//! # Runlog Storage
//!
//! Storage of console sessions on top of a transactional key-value backend.
//!
//! ## Features
//!
//! - **ConsoleStorage trait**: Everything a session context and a monitoring
//!   surface need from storage
//! - **BufferedConsoleStorage**: Buffers lines in a [`ConsoleHub`] and commits
//!   them in one transaction on flush
//! - **DirectConsoleStorage**: Commits every line as it is written
//! - **InMemoryConsoleHub**: Concurrent write buffer for in-flight sessions
//! - **CompactionPolicy**: Moves oversized messages into the metadata hash
//! - **InMemoryBackend**: In-memory [`KeyValueBackend`] for tests and simulation
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use runlog_core::{ConsoleId, ConsoleLine};
//! use runlog_storage::{
//!     BufferedConsoleStorage, ConsoleStorage, InMemoryBackend, InMemoryConsoleHub,
//! };
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let hub = Arc::new(InMemoryConsoleHub::new());
//! let storage = BufferedConsoleStorage::new(backend, hub);
//!
//! let id = ConsoleId::new("1", Utc::now()).unwrap();
//! storage.init_console(&id).unwrap();
//! storage.add_line(&id, ConsoleLine::text("hello").at(0.001)).unwrap();
//! storage.flush(&id).unwrap();
//!
//! assert_eq!(storage.line_count(&id).unwrap(), 1);
//! ```

pub mod address;
pub mod buffered;
pub mod compaction;
pub mod direct;
pub mod error;
pub mod hub;
pub mod memory;
pub mod sessions;

// Re-exports
pub use address::local_worker_address;
pub use buffered::BufferedConsoleStorage;
pub use compaction::{CompactedLine, CompactionPolicy, ENVELOPE_OVERHEAD, VALUE_FIELD_LIMIT};
pub use direct::DirectConsoleStorage;
pub use error::StorageError;
pub use hub::{ConsoleHub, InMemoryConsoleHub, LineBuffer};
pub use memory::InMemoryBackend;
pub use sessions::{JOB_ID_FIELD, PROGRESS_FIELD, SessionStore, WORKER_ADDRESS_FIELD};

// Re-export the backend capability for convenience
pub use runlog_core::{KeyValueBackend, WriteBatch};

use std::time::Duration;

use runlog_core::{ConsoleId, ConsoleLine};

/// Storage of console sessions
///
/// A session is written by exactly one job execution and read by any number
/// of monitoring callers, possibly while it is still being written.
pub trait ConsoleStorage: Send + Sync {
    /// Prepare a new session and record the worker it runs on
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the session is already
    /// live in this process.
    fn init_console(&self, id: &ConsoleId) -> Result<(), StorageError>;

    /// Append a line to a session
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the store buffers lines and the
    /// session was never initialized or is already flushed.
    fn add_line(&self, id: &ConsoleId, line: ConsoleLine) -> Result<(), StorageError>;

    /// Make every line added so far durable, in one transaction
    fn flush(&self, id: &ConsoleId) -> Result<(), StorageError>;

    /// Release a session that will never be flushed, dropping its unflushed lines
    ///
    /// Returns the number of lines dropped.
    fn discard(&self, id: &ConsoleId) -> usize;

    /// Expire the session's structures under every key scheme after `ttl`
    fn expire(&self, id: &ConsoleId, ttl: Duration) -> Result<(), StorageError>;

    /// Remove any expiry from the session's structures under every key scheme
    fn persist(&self, id: &ConsoleId) -> Result<(), StorageError>;

    /// Remaining time to live of the session, `None` if it never expires
    fn console_ttl(&self, id: &ConsoleId) -> Result<Option<Duration>, StorageError>;

    /// Number of lines in the session
    fn line_count(&self, id: &ConsoleId) -> Result<usize, StorageError>;

    /// Lines at positions `start..=end`, with references resolved
    fn lines(&self, id: &ConsoleId, start: usize, end: usize) -> Result<Vec<ConsoleLine>, StorageError>;

    /// Latest value of the primary progress bar
    ///
    /// `None` when no value was written or the stored value is corrupt.
    fn progress(&self, id: &ConsoleId) -> Result<Option<f64>, StorageError>;

    /// Address of the worker that ran the session
    fn worker_address(&self, id: &ConsoleId) -> Result<Option<String>, StorageError>;
}
