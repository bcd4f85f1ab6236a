//! Write buffer for in-flight console sessions
//!
//! While a job executes, its lines are collected in memory instead of
//! committing one transaction per line. The buffer of a session lives from
//! [`ConsoleHub::init`] until [`ConsoleHub::flush`], and is readable by any
//! number of monitoring threads in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use runlog_core::{ConsoleId, ConsoleLine};
use tracing::{debug, trace, warn};

use crate::error::StorageError;

/// Registry of buffered console sessions
///
/// Exactly one writer appends to a given session; readers may take
/// snapshots concurrently. No call assumes atomicity with any other call.
pub trait ConsoleHub: Send + Sync + std::fmt::Debug {
    /// Register an empty buffer for `id`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if `id` is already registered.
    fn init(&self, id: &ConsoleId) -> Result<(), StorageError>;

    /// Append a line to the buffer of `id`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `id` is not registered.
    fn add_line(&self, id: &ConsoleId, line: ConsoleLine) -> Result<(), StorageError>;

    /// Live view of the buffer of `id`
    ///
    /// An unregistered id yields an empty buffer, meaning "look in the
    /// persistent store instead".
    fn lines(&self, id: &ConsoleId) -> Arc<LineBuffer>;

    /// Whether `id` is registered
    fn contains(&self, id: &ConsoleId) -> bool;

    /// Drop the buffer of `id`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `id` is not registered.
    fn flush(&self, id: &ConsoleId) -> Result<(), StorageError>;
}

/// Append-only line sequence of one session
///
/// Readers hold the lock only while copying out lines, and the length is
/// readable without locking.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: RwLock<Vec<ConsoleLine>>,
    len: AtomicUsize,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line
    pub fn push(&self, line: ConsoleLine) {
        let mut lines = self.lines.write();
        lines.push(line);
        self.len.store(lines.len(), Ordering::Release);
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all buffered lines
    pub fn snapshot(&self) -> Vec<ConsoleLine> {
        self.lines.read().clone()
    }

    /// Copy of the lines at positions `start..=end`
    pub fn range(&self, start: usize, end: usize) -> Vec<ConsoleLine> {
        if start > end {
            return Vec::new();
        }
        let lines = self.lines.read();
        lines
            .iter()
            .skip(start)
            .take(end.saturating_sub(start).saturating_add(1))
            .cloned()
            .collect()
    }

    /// Most recent line matching `predicate`
    pub fn latest_where(&self, predicate: impl Fn(&ConsoleLine) -> bool) -> Option<ConsoleLine> {
        self.lines.read().iter().rev().find(|l| predicate(l)).cloned()
    }
}

/// In-memory implementation of [`ConsoleHub`]
///
/// Uses `DashMap` for concurrent access to the buffers of all in-flight
/// sessions of this process. Share one instance through an `Arc` between the
/// job-execution side and the monitoring side.
#[derive(Debug, Default)]
pub struct InMemoryConsoleHub {
    sessions: DashMap<ConsoleId, Arc<LineBuffer>>,
}

impl InMemoryConsoleHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently buffered
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every buffered session, returning how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = self.sessions.len();
        self.sessions.clear();
        if dropped > 0 {
            debug!(sessions = dropped, "Cleared console hub");
        }
        dropped
    }
}

impl ConsoleHub for InMemoryConsoleHub {
    fn init(&self, id: &ConsoleId) -> Result<(), StorageError> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(LineBuffer::new()));
                trace!(console = %id, "Registered console buffer");
                Ok(())
            }
        }
    }

    fn add_line(&self, id: &ConsoleId, line: ConsoleLine) -> Result<(), StorageError> {
        // Clone the handle so the map shard is not held while appending
        let buffer = self
            .sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::not_found(id))?;

        buffer.push(line);
        Ok(())
    }

    fn lines(&self, id: &ConsoleId) -> Arc<LineBuffer> {
        match self.sessions.get(id) {
            Some(entry) => Arc::clone(entry.value()),
            None => Arc::new(LineBuffer::new()),
        }
    }

    fn contains(&self, id: &ConsoleId) -> bool {
        self.sessions.contains_key(id)
    }

    fn flush(&self, id: &ConsoleId) -> Result<(), StorageError> {
        match self.sessions.remove(id) {
            Some((_, buffer)) => {
                trace!(console = %id, lines = buffer.len(), "Evicted console buffer");
                Ok(())
            }
            None => Err(StorageError::not_found(id)),
        }
    }
}

impl Drop for InMemoryConsoleHub {
    fn drop(&mut self) {
        let pending = self.sessions.len();
        if pending > 0 {
            warn!(sessions = pending, "Console hub dropped with unflushed sessions");
        }
    }
}
