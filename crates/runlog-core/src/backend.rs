//! Capabilities consumed from the hosting job storage
//!
//! The console store does not own a database. It is handed a
//! [`KeyValueBackend`] offering sorted sets and hashes with expiry, where all
//! writes are collected in a [`WriteBatch`] and committed at once. A
//! [`JobStateSource`] gives read access to a job's current state, from which
//! the session start time is recovered.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::BackendError;

/// A single write queued in a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Add `member` to the sorted set at `key` with `score`
    AddToSortedSet {
        key: String,
        member: String,
        score: f64,
    },
    /// Set `field` of the hash at `key`
    SetHashField {
        key: String,
        field: String,
        value: String,
    },
    /// Expire the sorted set at `key` after `ttl`
    ExpireSortedSet { key: String, ttl: Duration },
    /// Expire the hash at `key` after `ttl`
    ExpireHash { key: String, ttl: Duration },
    /// Remove any expiry from the sorted set at `key`
    PersistSortedSet { key: String },
    /// Remove any expiry from the hash at `key`
    PersistHash { key: String },
}

/// Writes applied atomically by [`KeyValueBackend::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_sorted_set(&mut self, key: impl Into<String>, member: impl Into<String>, score: f64) {
        self.ops.push(WriteOp::AddToSortedSet {
            key: key.into(),
            member: member.into(),
            score,
        });
    }

    pub fn set_hash_field(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.ops.push(WriteOp::SetHashField {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
    }

    pub fn expire_sorted_set(&mut self, key: impl Into<String>, ttl: Duration) {
        self.ops.push(WriteOp::ExpireSortedSet { key: key.into(), ttl });
    }

    pub fn expire_hash(&mut self, key: impl Into<String>, ttl: Duration) {
        self.ops.push(WriteOp::ExpireHash { key: key.into(), ttl });
    }

    pub fn persist_sorted_set(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::PersistSortedSet { key: key.into() });
    }

    pub fn persist_hash(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::PersistHash { key: key.into() });
    }

    /// Queued operations in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations in order
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Transactional key-value capability required by the console store
///
/// Implementations must apply a committed batch atomically: readers observe
/// either none or all of its operations. Expired keys read as absent.
pub trait KeyValueBackend: Send + Sync {
    /// Apply every operation of `batch` in one transaction
    fn commit(&self, batch: WriteBatch) -> Result<(), BackendError>;

    /// Number of members of the sorted set at `key` (0 if absent)
    fn sorted_set_count(&self, key: &str) -> Result<usize, BackendError>;

    /// Members at positions `start..=end` in ascending score order
    ///
    /// Positions past the end of the set are ignored.
    fn sorted_set_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, BackendError>;

    /// Value of `field` in the hash at `key`
    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, BackendError>;

    /// Remaining time to live of the hash at `key`
    ///
    /// `None` when the hash is absent or has no expiry.
    fn hash_ttl(&self, key: &str) -> Result<Option<Duration>, BackendError>;
}

/// Snapshot of a job's current state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStateSnapshot {
    /// State name, e.g. `Processing`
    pub name: String,
    /// State data
    pub data: HashMap<String, String>,
}

impl JobStateSnapshot {
    /// Name of the state a job is in while it executes
    pub const PROCESSING: &'static str = "Processing";

    /// Data key holding the processing start time
    pub const STARTED_AT: &'static str = "StartedAt";

    /// Create a snapshot
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: HashMap::new(),
        }
    }

    /// Add a data entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Whether the job is currently processing (state names compare case-insensitively)
    pub fn is_processing(&self) -> bool {
        self.name.eq_ignore_ascii_case(Self::PROCESSING)
    }

    /// Processing start time, from epoch milliseconds or an RFC 3339 string
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.data.get(Self::STARTED_AT)?.trim();

        if let Ok(millis) = raw.parse::<i64>() {
            return DateTime::from_timestamp_millis(millis);
        }

        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Read access to job state
pub trait JobStateSource: Send + Sync {
    /// Current state of `job_id`, or `None` if the job is unknown
    fn state(&self, job_id: &str) -> Result<Option<JobStateSnapshot>, BackendError>;
}
