//! Console storage backed by a write buffer
//!
//! Lines go to a [`ConsoleHub`] while the job runs and reach the backend in
//! a single transaction on [`ConsoleStorage::flush`]. Reads consult the
//! buffer first, then the persisted structures of each key scheme.

use std::sync::Arc;
use std::time::Duration;

use runlog_core::{ConsoleId, ConsoleLine, KeyValueBackend, WriteBatch};
use tracing::{debug, instrument, warn};

use crate::ConsoleStorage;
use crate::address::local_worker_address;
use crate::error::StorageError;
use crate::hub::ConsoleHub;
use crate::sessions::SessionStore;

/// [`ConsoleStorage`] that buffers lines in a [`ConsoleHub`] until flush
#[derive(Debug)]
pub struct BufferedConsoleStorage {
    hub: Arc<dyn ConsoleHub>,
    sessions: SessionStore,
    worker_address: String,
}

impl BufferedConsoleStorage {
    /// Create a buffered store over `backend`, recording the detected worker address
    pub fn new(backend: Arc<dyn KeyValueBackend>, hub: Arc<dyn ConsoleHub>) -> Self {
        Self::with_sessions(SessionStore::new(backend), hub)
    }

    /// Create a buffered store from a configured [`SessionStore`]
    pub fn with_sessions(sessions: SessionStore, hub: Arc<dyn ConsoleHub>) -> Self {
        Self {
            hub,
            sessions,
            worker_address: local_worker_address().to_string(),
        }
    }

    /// Override the worker address recorded by `init_console`
    pub fn with_worker_address(mut self, address: impl Into<String>) -> Self {
        self.worker_address = address.into();
        self
    }

    /// The write buffer this store drains
    pub fn hub(&self) -> &Arc<dyn ConsoleHub> {
        &self.hub
    }

    /// Drop the buffer of `id`, returning how many lines it held
    fn evict(&self, id: &ConsoleId) -> usize {
        let pending = self.hub.lines(id).len();
        match self.hub.flush(id) {
            Ok(()) => pending,
            Err(_) => 0,
        }
    }
}

impl ConsoleStorage for BufferedConsoleStorage {
    fn init_console(&self, id: &ConsoleId) -> Result<(), StorageError> {
        self.hub.init(id)?;

        let mut batch = WriteBatch::new();
        self.sessions
            .stage_metadata(&mut batch, id, Some(self.worker_address.as_str()));
        if let Err(err) = self.sessions.commit(batch) {
            // no context exists for a failed init, so nothing would flush it
            self.evict(id);
            return Err(err);
        }

        debug!(console = %id, worker = %self.worker_address, "Initialized buffered console");
        Ok(())
    }

    fn add_line(&self, id: &ConsoleId, line: ConsoleLine) -> Result<(), StorageError> {
        SessionStore::validate_line(&line)?;
        self.hub.add_line(id, line)
    }

    #[instrument(skip(self, id), fields(console = %id))]
    fn flush(&self, id: &ConsoleId) -> Result<(), StorageError> {
        if !self.hub.contains(id) {
            return Err(StorageError::not_found(id));
        }

        let lines = self.hub.lines(id).snapshot();

        let mut batch = WriteBatch::new();
        self.sessions.stage_metadata(&mut batch, id, None);
        for line in &lines {
            self.sessions.stage_line(&mut batch, id, line)?;
        }
        self.sessions.commit(batch)?;

        self.hub.flush(id)?;
        debug!(lines = lines.len(), "Flushed console buffer");
        Ok(())
    }

    fn discard(&self, id: &ConsoleId) -> usize {
        let dropped = self.evict(id);
        if dropped > 0 {
            warn!(console = %id, lines = dropped, "Discarded unflushed console lines");
        }
        dropped
    }

    #[instrument(skip(self, id), fields(console = %id))]
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
        let buffered = self.hub.lines(id).len();
        if buffered > 0 {
            return Ok(buffered);
        }
        self.sessions.count(id)
    }

    fn lines(&self, id: &ConsoleId, start: usize, end: usize) -> Result<Vec<ConsoleLine>, StorageError> {
        let buffered = self.hub.lines(id).range(start, end);
        if !buffered.is_empty() {
            return Ok(buffered);
        }
        self.sessions.lines(id, start, end)
    }

    fn progress(&self, id: &ConsoleId) -> Result<Option<f64>, StorageError> {
        let buffered = self
            .hub
            .lines(id)
            .latest_where(ConsoleLine::is_primary_progress)
            .and_then(|line| line.progress_value);

        match buffered {
            Some(value) => Ok(Some(value)),
            None => self.sessions.progress(id),
        }
    }

    fn worker_address(&self, id: &ConsoleId) -> Result<Option<String>, StorageError> {
        self.sessions.worker_address(id)
    }
}
