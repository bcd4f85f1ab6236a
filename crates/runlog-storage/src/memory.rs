//! In-memory key-value backend
//!
//! This module provides an in-memory implementation of [`KeyValueBackend`],
//! suitable for testing and simulation environments. It follows the usual
//! semantics of sorted-set/hash stores: re-adding a member updates its score,
//! expiring or persisting an absent key does nothing, and expired keys read
//! as absent.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use runlog_core::{BackendError, Clock, KeyValueBackend, SystemClock, WriteBatch, WriteOp};
use tracing::{debug, trace};

/// Score wrapper giving `f64` a total order
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, Score>,
    ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn add(&mut self, member: String, score: f64) {
        let score = Score(score);
        if let Some(previous) = self.scores.insert(member.clone(), score) {
            self.ordered.remove(&(previous, member.clone()));
        }
        self.ordered.insert((score, member));
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn range(&self, start: usize, end: usize) -> Vec<String> {
        if start > end {
            return Vec::new();
        }
        self.ordered
            .iter()
            .skip(start)
            .take(end.saturating_sub(start).saturating_add(1))
            .map(|(_, member)| member.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    sorted_sets: HashMap<String, SortedSet>,
    hashes: HashMap<String, HashMap<String, String>>,
    set_expiry: HashMap<String, DateTime<Utc>>,
    hash_expiry: HashMap<String, DateTime<Utc>>,
}

impl State {
    fn set_live(&self, key: &str, now: DateTime<Utc>) -> Option<&SortedSet> {
        match self.set_expiry.get(key) {
            Some(at) if *at <= now => None,
            _ => self.sorted_sets.get(key),
        }
    }

    fn hash_live(&self, key: &str, now: DateTime<Utc>) -> Option<&HashMap<String, String>> {
        match self.hash_expiry.get(key) {
            Some(at) if *at <= now => None,
            _ => self.hashes.get(key),
        }
    }

    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let expired_sets: Vec<String> = self
            .set_expiry
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let expired_hashes: Vec<String> = self
            .hash_expiry
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_sets {
            self.set_expiry.remove(key);
            self.sorted_sets.remove(key);
        }
        for key in &expired_hashes {
            self.hash_expiry.remove(key);
            self.hashes.remove(key);
        }

        expired_sets.len() + expired_hashes.len()
    }

    fn apply(&mut self, op: WriteOp, now: DateTime<Utc>) {
        match op {
            WriteOp::AddToSortedSet { key, member, score } => {
                self.sorted_sets.entry(key).or_default().add(member, score);
            }
            WriteOp::SetHashField { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            WriteOp::ExpireSortedSet { key, ttl } => {
                if self.sorted_sets.contains_key(&key) {
                    self.set_expiry.insert(key, expiry_at(now, ttl));
                }
            }
            WriteOp::ExpireHash { key, ttl } => {
                if self.hashes.contains_key(&key) {
                    self.hash_expiry.insert(key, expiry_at(now, ttl));
                }
            }
            WriteOp::PersistSortedSet { key } => {
                self.set_expiry.remove(&key);
            }
            WriteOp::PersistHash { key } => {
                self.hash_expiry.remove(&key);
            }
        }
    }
}

fn expiry_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn remaining(now: DateTime<Utc>, at: Option<&DateTime<Utc>>) -> Option<Duration> {
    let at = at?;
    (*at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// In-memory implementation of [`KeyValueBackend`]
///
/// All state sits behind one lock, so a committed batch is applied
/// atomically with respect to readers.
pub struct InMemoryBackend {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    commits: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create an empty backend using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty backend using `clock` for expiry
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            commits: AtomicUsize::new(0),
        }
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Remaining TTL of the sorted set at `key`
    pub fn sorted_set_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_utc();
        let state = self.state.read();
        state.set_live(key, now)?;
        remaining(now, state.set_expiry.get(key))
    }

    /// All live fields of the hash at `key`
    pub fn hash_fields(&self, key: &str) -> HashMap<String, String> {
        let now = self.clock.now_utc();
        self.state
            .read()
            .hash_live(key, now)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every expired key, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_utc();
        let purged = self.state.write().purge(now);
        if purged > 0 {
            debug!(keys = purged, "Purged expired keys");
        }
        purged
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryBackend")
            .field("sorted_sets", &state.sorted_sets.len())
            .field("hashes", &state.hashes.len())
            .field("commits", &self.commit_count())
            .finish()
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        let now = self.clock.now_utc();
        let ops = batch.len();

        let mut state = self.state.write();
        // Writes to an expired key start from scratch
        state.purge(now);
        for op in batch.into_ops() {
            state.apply(op, now);
        }
        drop(state);

        self.commits.fetch_add(1, Ordering::SeqCst);
        trace!(ops, "Applied batch");
        Ok(())
    }

    fn sorted_set_count(&self, key: &str) -> Result<usize, BackendError> {
        let now = self.clock.now_utc();
        Ok(self.state.read().set_live(key, now).map_or(0, SortedSet::len))
    }

    fn sorted_set_range(&self, key: &str, start: usize, end: usize) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now_utc();
        Ok(self
            .state
            .read()
            .set_live(key, now)
            .map(|set| set.range(start, end))
            .unwrap_or_default())
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, BackendError> {
        let now = self.clock.now_utc();
        Ok(self
            .state
            .read()
            .hash_live(key, now)
            .and_then(|hash| hash.get(field).cloned()))
    }

    fn hash_ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        let now = self.clock.now_utc();
        let state = self.state.read();
        if state.hash_live(key, now).is_none() {
            return Ok(None);
        }
        Ok(remaining(now, state.hash_expiry.get(key)))
    }
}
