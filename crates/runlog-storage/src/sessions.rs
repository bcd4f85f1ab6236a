//! Persisted session structures
//!
//! [`SessionStore`] knows how a session is laid out in the backend: an
//! ordered log of encoded [`LineRecord`]s scored by time offset, and a
//! metadata hash. It stages writes into a [`WriteBatch`] and reads through
//! every configured [`KeyScheme`], newest first. Both the buffered and the
//! direct storage build on it.

use std::sync::Arc;
use std::time::Duration;

use runlog_core::{
    ConsoleId, ConsoleLine, KeyScheme, KeySchemes, KeyValueBackend, LinePayload, LineRecord,
    WriteBatch,
};
use tracing::{debug, trace, warn};

use crate::compaction::CompactionPolicy;
use crate::error::StorageError;

/// Metadata field holding the job id
pub const JOB_ID_FIELD: &str = "jobId";

/// Metadata field holding the address of the worker that ran the session
pub const WORKER_ADDRESS_FIELD: &str = "workerAddress";

/// Metadata field mirroring the latest primary progress value
pub const PROGRESS_FIELD: &str = "progress";

/// Backend-facing half of console storage
pub struct SessionStore {
    backend: Arc<dyn KeyValueBackend>,
    schemes: KeySchemes,
    compaction: CompactionPolicy,
}

impl SessionStore {
    /// Create a store over `backend` with the default key schemes and compaction
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            schemes: KeySchemes::default(),
            compaction: CompactionPolicy::default(),
        }
    }

    /// Replace the key schemes
    pub fn with_schemes(mut self, schemes: KeySchemes) -> Self {
        self.schemes = schemes;
        self
    }

    /// Replace the compaction policy
    pub fn with_compaction(mut self, compaction: CompactionPolicy) -> Self {
        self.compaction = compaction;
        self
    }

    /// The configured key schemes
    pub fn schemes(&self) -> &KeySchemes {
        &self.schemes
    }

    /// Stage the session's job id and, when given, the worker address
    pub fn stage_metadata(&self, batch: &mut WriteBatch, id: &ConsoleId, worker_address: Option<&str>) {
        let meta_key = self.schemes.newest().meta_key(id);
        batch.set_hash_field(meta_key.as_str(), JOB_ID_FIELD, id.job_id());
        if let Some(address) = worker_address {
            batch.set_hash_field(meta_key, WORKER_ADDRESS_FIELD, address);
        }
    }

    /// Check that `line` survives encoding unchanged
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidLine`] for a non-finite time offset, or
    /// a progress value that is non-finite or outside `[0, 100]`.
    pub fn validate_line(line: &ConsoleLine) -> Result<(), StorageError> {
        if !line.time_offset.is_finite() {
            return Err(StorageError::invalid_line(format!(
                "time offset {} is not finite",
                line.time_offset
            )));
        }

        if let Some(value) = line.progress_value {
            if !(0.0..=100.0).contains(&value) {
                return Err(StorageError::invalid_line(format!(
                    "progress value {value} out of range 0..100"
                )));
            }
        }

        Ok(())
    }

    /// Stage one line, compacting it if needed and mirroring primary progress
    pub fn stage_line(
        &self,
        batch: &mut WriteBatch,
        id: &ConsoleId,
        line: &ConsoleLine,
    ) -> Result<(), StorageError> {
        let scheme = self.schemes.newest();
        let meta_key = scheme.meta_key(id);
        let compacted = self.compaction.compact(line)?;

        if let Some((token, text)) = compacted.overflow {
            trace!(console = %id, bytes = text.len(), "Moving oversized line to metadata");
            batch.set_hash_field(meta_key.as_str(), token, text);
        }

        batch.add_to_sorted_set(scheme.log_key(id), compacted.encoded, line.time_offset);

        if let Some(value) = line.progress_value.filter(|_| line.is_primary_progress()) {
            batch.set_hash_field(meta_key, PROGRESS_FIELD, value.to_string());
        }

        Ok(())
    }

    /// Stage a TTL on both structures of every key scheme
    pub fn stage_expire(&self, batch: &mut WriteBatch, id: &ConsoleId, ttl: Duration) {
        for scheme in self.schemes.iter() {
            batch.expire_sorted_set(scheme.log_key(id), ttl);
            batch.expire_hash(scheme.meta_key(id), ttl);
        }
    }

    /// Stage removal of the TTL on both structures of every key scheme
    pub fn stage_persist(&self, batch: &mut WriteBatch, id: &ConsoleId) {
        for scheme in self.schemes.iter() {
            batch.persist_sorted_set(scheme.log_key(id));
            batch.persist_hash(scheme.meta_key(id));
        }
    }

    /// Commit a staged batch in one transaction
    pub fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        self.backend.commit(batch)?;
        trace!(ops, "Committed console batch");
        Ok(())
    }

    /// Remaining TTL of the current metadata hash
    pub fn ttl(&self, id: &ConsoleId) -> Result<Option<Duration>, StorageError> {
        let meta_key = self.schemes.newest().meta_key(id);
        Ok(self.backend.hash_ttl(&meta_key)?)
    }

    /// Number of persisted lines under the first key scheme holding any
    pub fn count(&self, id: &ConsoleId) -> Result<usize, StorageError> {
        for scheme in self.schemes.iter() {
            let count = self.backend.sorted_set_count(&scheme.log_key(id))?;
            if count > 0 {
                return Ok(count);
            }
        }
        Ok(0)
    }

    /// Persisted lines at positions `start..=end`, dereferenced
    ///
    /// Returns the range from the first key scheme yielding any line.
    pub fn lines(&self, id: &ConsoleId, start: usize, end: usize) -> Result<Vec<ConsoleLine>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }

        for scheme in self.schemes.iter() {
            let raw = self.backend.sorted_set_range(&scheme.log_key(id), start, end)?;
            if raw.is_empty() {
                continue;
            }

            debug!(console = %id, scheme = scheme.name(), lines = raw.len(), "Read persisted lines");

            return raw
                .iter()
                .map(|value| {
                    let record = LineRecord::decode(value)?;
                    self.resolve(scheme, id, record)
                })
                .collect();
        }

        Ok(Vec::new())
    }

    /// Persisted primary progress, or `None` when unset or unparseable
    pub fn progress(&self, id: &ConsoleId) -> Result<Option<f64>, StorageError> {
        let meta_key = self.schemes.newest().meta_key(id);
        let Some(raw) = self.backend.hash_get(&meta_key, PROGRESS_FIELD)? else {
            return Ok(None);
        };

        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => {
                warn!(console = %id, value = %raw, "Ignoring unparseable progress value");
                Ok(None)
            }
        }
    }

    /// Recorded worker address of the session
    pub fn worker_address(&self, id: &ConsoleId) -> Result<Option<String>, StorageError> {
        let meta_key = self.schemes.newest().meta_key(id);
        Ok(self.backend.hash_get(&meta_key, WORKER_ADDRESS_FIELD)?)
    }

    /// Turn a stored record back into a line, expanding references
    ///
    /// A reference that cannot be resolved yields its raw token. Backend
    /// failures are only tolerated for schemes that allow it.
    fn resolve(
        &self,
        scheme: &dyn KeyScheme,
        id: &ConsoleId,
        record: LineRecord,
    ) -> Result<ConsoleLine, StorageError> {
        let message = match &record.payload {
            LinePayload::Inline(text) => text.clone(),
            LinePayload::Reference(token) => {
                match self.backend.hash_get(&scheme.meta_key(id), token) {
                    Ok(Some(text)) => text,
                    Ok(None) => {
                        warn!(console = %id, token = %token, "Dangling line reference");
                        token.clone()
                    }
                    Err(err) if scheme.lenient_dereference() => {
                        debug!(
                            console = %id,
                            scheme = scheme.name(),
                            error = %err,
                            "Could not resolve line reference"
                        );
                        token.clone()
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        Ok(record.into_line_with(message))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("schemes", &self.schemes)
            .field("compaction", &self.compaction)
            .finish_non_exhaustive()
    }
}
