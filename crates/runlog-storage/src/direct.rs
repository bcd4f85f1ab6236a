//! Console storage without a write buffer
//!
//! Every line is committed in its own transaction as soon as it is added.
//! Simpler and slower than [`BufferedConsoleStorage`](crate::BufferedConsoleStorage),
//! and needs no process-local state, so any process can read a live session.

use std::sync::Arc;
use std::time::Duration;

use runlog_core::{ConsoleId, ConsoleLine, KeyValueBackend, WriteBatch};
use tracing::debug;

use crate::ConsoleStorage;
use crate::address::local_worker_address;
use crate::error::StorageError;
use crate::sessions::SessionStore;

/// [`ConsoleStorage`] committing each line directly to the backend
#[derive(Debug)]
pub struct DirectConsoleStorage {
    sessions: SessionStore,
    worker_address: String,
}

impl DirectConsoleStorage {
    /// Create a direct store over `backend`, recording the detected worker address
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::with_sessions(SessionStore::new(backend))
    }

    /// Create a direct store from a configured [`SessionStore`]
    pub fn with_sessions(sessions: SessionStore) -> Self {
        Self {
            sessions,
            worker_address: local_worker_address().to_string(),
        }
    }

    /// Override the worker address recorded by `init_console`
    pub fn with_worker_address(mut self, address: impl Into<String>) -> Self {
        self.worker_address = address.into();
        self
    }
}

impl ConsoleStorage for DirectConsoleStorage {
    fn init_console(&self, id: &ConsoleId) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        self.sessions
            .stage_metadata(&mut batch, id, Some(self.worker_address.as_str()));
        self.sessions.commit(batch)?;

        debug!(console = %id, worker = %self.worker_address, "Initialized direct console");
        Ok(())
    }

    fn add_line(&self, id: &ConsoleId, line: ConsoleLine) -> Result<(), StorageError> {
        SessionStore::validate_line(&line)?;

        let mut batch = WriteBatch::new();
        self.sessions.stage_line(&mut batch, id, &line)?;
        self.sessions.commit(batch)
    }

    fn flush(&self, _id: &ConsoleId) -> Result<(), StorageError> {
        Ok(())
    }

    fn discard(&self, _id: &ConsoleId) -> usize {
        0
    }

    fn expire(&self, id: &ConsoleId, ttl: Duration) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        self.sessions.stage_expire(&mut batch, id, ttl);
        self.sessions.commit(batch)
    }

    fn persist(&self, id: &ConsoleId) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        self.sessions.stage_persist(&mut batch, id);
        self.sessions.commit(batch)
    }

    fn console_ttl(&self, id: &ConsoleId) -> Result<Option<Duration>, StorageError> {
        self.sessions.ttl(id)
    }

    fn line_count(&self, id: &ConsoleId) -> Result<usize, StorageError> {
        self.sessions.count(id)
    }

    fn lines(&self, id: &ConsoleId, start: usize, end: usize) -> Result<Vec<ConsoleLine>, StorageError> {
        self.sessions.lines(id, start, end)
    }

    fn progress(&self, id: &ConsoleId) -> Result<Option<f64>, StorageError> {
        self.sessions.progress(id)
    }

    fn worker_address(&self, id: &ConsoleId) -> Result<Option<String>, StorageError> {
        self.sessions.worker_address(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use chrono::{TimeZone, Utc};

    fn id() -> ConsoleId {
        ConsoleId::new("5", Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap()).unwrap()
    }

    #[test]
    fn test_each_line_commits() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = DirectConsoleStorage::new(backend.clone()).with_worker_address("10.1.1.1");
        let id = id();

        storage.init_console(&id).unwrap();
        storage.add_line(&id, ConsoleLine::text("one").at(0.1)).unwrap();
        storage.add_line(&id, ConsoleLine::progress("1", 50.0).at(0.2)).unwrap();

        assert_eq!(backend.commit_count(), 3);
        assert_eq!(storage.line_count(&id).unwrap(), 2);
        assert_eq!(storage.progress(&id).unwrap(), Some(50.0));
        assert_eq!(storage.worker_address(&id).unwrap().as_deref(), Some("10.1.1.1"));
    }

    #[test]
    fn test_flush_is_noop() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = DirectConsoleStorage::new(backend.clone());

        storage.flush(&id()).unwrap();
        assert_eq!(backend.commit_count(), 0);
    }

    #[test]
    fn test_long_line_round_trips() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = DirectConsoleStorage::new(backend);
        let id = id();
        let text = "q".repeat(2048);

        storage.add_line(&id, ConsoleLine::text(text.clone()).at(1.0)).unwrap();

        assert_eq!(storage.lines(&id, 0, 0).unwrap()[0].message, text);
    }
}
