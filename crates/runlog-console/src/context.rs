//! Console session context
//!
//! A [`ConsoleContext`] is the per-execution handle a job writes through. It
//! stamps every line with a time offset relative to the session start and
//! forwards it to the configured [`ConsoleStorage`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use runlog_core::{Clock, ConsoleId, ConsoleLine, SystemClock, TextColor};
use runlog_storage::ConsoleStorage;
use tracing::{debug, instrument, trace};

use crate::error::ConsoleError;
use crate::progress::{DefaultProgressBar, ProgressBar};

/// Increment applied to an offset that does not advance past the previous one
pub const OFFSET_EPSILON: f64 = 1e-4;

/// Round elapsed seconds to millisecond resolution
fn round_offset(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Write handle for one console session
///
/// Creating a context registers the session with its store. A single job
/// execution is expected to write through it; concurrent calls are still
/// serialized so offsets stay strictly increasing.
pub struct ConsoleContext {
    id: ConsoleId,
    storage: Arc<dyn ConsoleStorage>,
    clock: Arc<dyn Clock>,
    last_offset: Mutex<Option<f64>>,
    next_bar_id: AtomicU32,
}

impl ConsoleContext {
    /// Start a session on `storage` using the system clock
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`](runlog_storage::StorageError::AlreadyExists)
    /// if the session is already live, or any backend failure of the initial write.
    pub fn new(id: ConsoleId, storage: Arc<dyn ConsoleStorage>) -> Result<Self, ConsoleError> {
        Self::with_clock(id, storage, Arc::new(SystemClock))
    }

    /// Start a session on `storage`, reading time from `clock`
    pub fn with_clock(
        id: ConsoleId,
        storage: Arc<dyn ConsoleStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConsoleError> {
        storage.init_console(&id)?;
        debug!(console_id = %id, job_id = id.job_id(), "Console session started");

        Ok(Self {
            id,
            storage,
            clock,
            last_offset: Mutex::new(None),
            next_bar_id: AtomicU32::new(1),
        })
    }

    /// The session this context writes to
    pub fn id(&self) -> &ConsoleId {
        &self.id
    }

    /// The store backing this session
    pub fn storage(&self) -> &Arc<dyn ConsoleStorage> {
        &self.storage
    }

    /// Append a line, assigning its time offset
    ///
    /// The offset is the time elapsed since the session start, in seconds
    /// rounded to milliseconds. An offset that does not exceed the previous
    /// one is moved to the previous offset plus [`OFFSET_EPSILON`].
    pub fn add_line(&self, line: ConsoleLine) -> Result<(), ConsoleError> {
        let elapsed = self.clock.now_utc() - self.id.started_at();
        let mut offset = round_offset(elapsed.num_milliseconds() as f64 / 1000.0);

        let mut last = self.last_offset.lock();
        if let Some(previous) = *last {
            if previous >= offset {
                offset = previous + OFFSET_EPSILON;
            }
        }
        *last = Some(offset);

        trace!(console_id = %self.id, offset, "Adding console line");
        self.storage.add_line(&self.id, line.at(offset))?;
        Ok(())
    }

    /// Append a text line
    pub fn write_line(&self, text: impl Into<String>, color: Option<TextColor>) -> Result<(), ConsoleError> {
        self.add_line(ConsoleLine::text(text).with_color(color))
    }

    /// Create a progress bar with whole-number values and write its initial value
    ///
    /// Bars get sequential ids starting at `1`; the first bar of a session is
    /// its primary progress bar.
    pub fn write_progress_bar(
        &self,
        name: Option<&str>,
        initial: f64,
        color: Option<TextColor>,
    ) -> Result<DefaultProgressBar<'_>, ConsoleError> {
        self.write_progress_bar_with_digits(name, initial, color, 0)
    }

    /// Create a progress bar whose values are rounded to `digits` decimals
    pub fn write_progress_bar_with_digits(
        &self,
        name: Option<&str>,
        initial: f64,
        color: Option<TextColor>,
        digits: u32,
    ) -> Result<DefaultProgressBar<'_>, ConsoleError> {
        let bar_id = self.next_bar_id.fetch_add(1, Ordering::SeqCst);
        let bar = DefaultProgressBar::new(self, bar_id.to_string(), name, color, digits);
        bar.set_value(initial)?;
        Ok(bar)
    }

    /// Expire the session after `ttl`
    pub fn expire(&self, ttl: Duration) -> Result<(), ConsoleError> {
        self.storage.expire(&self.id, ttl)?;
        Ok(())
    }

    /// Re-apply the session's remaining TTL
    ///
    /// Lines written after the job's state changed may have been stored
    /// without an expiry. Sessions with no TTL are left alone.
    #[instrument(skip(self), fields(console_id = %self.id))]
    pub fn fix_expiration(&self) -> Result<(), ConsoleError> {
        match self.storage.console_ttl(&self.id)? {
            Some(ttl) if !ttl.is_zero() => {
                debug!(ttl_secs = ttl.as_secs(), "Re-applying console expiry");
                self.storage.expire(&self.id, ttl)?;
            }
            _ => trace!("Console session has no expiry, nothing to fix"),
        }
        Ok(())
    }

    /// Make every line written so far durable
    pub fn flush(&self) -> Result<(), ConsoleError> {
        self.storage.flush(&self.id)?;
        Ok(())
    }

    /// End the session; no further lines can be written through this context
    pub fn dispose(self) {
        debug!(console_id = %self.id, "Console session ended");
    }
}

impl std::fmt::Debug for ConsoleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleContext")
            .field("id", &self.id)
            .field("last_offset", &*self.last_offset.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use runlog_core::ManualClock;
    use runlog_storage::{
        BufferedConsoleStorage, DirectConsoleStorage, InMemoryBackend, InMemoryConsoleHub, StorageError,
    };

    struct Fixture {
        context: ConsoleContext,
        clock: Arc<ManualClock>,
        backend: Arc<InMemoryBackend>,
        storage: Arc<DirectConsoleStorage>,
    }

    fn setup() -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let storage = Arc::new(DirectConsoleStorage::new(backend.clone()).with_worker_address("10.1.1.1"));
        let id = ConsoleId::new("77", start).unwrap();
        let context = ConsoleContext::with_clock(id, storage.clone(), clock.clone()).unwrap();

        Fixture {
            context,
            clock,
            backend,
            storage,
        }
    }

    #[test]
    fn test_offsets_follow_clock() {
        let f = setup();

        f.context.write_line("first", None).unwrap();
        f.clock.advance(chrono::Duration::milliseconds(1500));
        f.context.write_line("second", Some(TextColor::RED)).unwrap();

        let lines = f.storage.lines(f.context.id(), 0, 1).unwrap();
        assert_eq!(lines[0].time_offset, 0.0);
        assert_eq!(lines[1].time_offset, 1.5);
        assert_eq!(lines[1].text_color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn test_colliding_offsets_are_nudged() {
        let f = setup();

        for i in 0..3 {
            f.context.write_line(format!("line {i}"), None).unwrap();
        }

        let offsets: Vec<f64> = f
            .storage
            .lines(f.context.id(), 0, 2)
            .unwrap()
            .iter()
            .map(|l| l.time_offset)
            .collect();
        assert_eq!(offsets[0], 0.0);
        assert!((offsets[1] - 0.0001).abs() < 1e-9);
        assert!((offsets[2] - 0.0002).abs() < 1e-9);
    }

    #[test]
    fn test_clock_going_backwards_keeps_order() {
        let f = setup();

        f.clock.advance(chrono::Duration::seconds(2));
        f.context.write_line("later", None).unwrap();
        f.clock.advance(chrono::Duration::seconds(-1));
        f.context.write_line("earlier clock", None).unwrap();

        let lines = f.storage.lines(f.context.id(), 0, 1).unwrap();
        assert!(lines[1].time_offset > lines[0].time_offset);
    }

    #[test]
    fn test_duplicate_session_fails() {
        let f = setup();
        let buffered: Arc<dyn ConsoleStorage> = Arc::new(
            BufferedConsoleStorage::new(f.backend.clone(), Arc::new(InMemoryConsoleHub::new()))
                .with_worker_address("10.1.1.1"),
        );

        let id = f.context.id().clone();
        let _first = ConsoleContext::with_clock(id.clone(), buffered.clone(), f.clock.clone()).unwrap();
        let second = ConsoleContext::with_clock(id, buffered, f.clock.clone());
        assert!(matches!(
            second,
            Err(ConsoleError::Storage(StorageError::AlreadyExists(_)))
        ));
    }

    #[test]
    fn test_progress_bar_ids_are_sequential() {
        let f = setup();

        let _primary = f.context.write_progress_bar(Some("download"), 0.0, None).unwrap();
        let _secondary = f.context.write_progress_bar(None, 10.0, None).unwrap();

        let lines = f.storage.lines(f.context.id(), 0, 1).unwrap();
        assert_eq!(lines[0].message, "1");
        assert_eq!(lines[0].progress_name.as_deref(), Some("download"));
        assert_eq!(lines[1].message, "2");
        assert_eq!(f.storage.progress(f.context.id()).unwrap(), Some(0.0));
    }

    #[test]
    fn test_invalid_initial_progress() {
        let f = setup();
        let result = f.context.write_progress_bar(None, 150.0, None);
        assert!(matches!(result, Err(ConsoleError::InvalidProgress(_))));
    }

    #[test]
    fn test_fix_expiration_without_ttl_is_noop() {
        let f = setup();
        f.context.write_line("x", None).unwrap();

        f.context.fix_expiration().unwrap();
        assert_eq!(f.storage.console_ttl(f.context.id()).unwrap(), None);
        assert_eq!(f.backend.sorted_set_ttl(&f.context.id().set_key()), None);
    }

    #[test]
    fn test_fix_expiration_covers_late_lines() {
        let f = setup();
        f.context.write_line("early", None).unwrap();
        f.context.expire(Duration::from_secs(600)).unwrap();

        f.clock.advance(chrono::Duration::seconds(100));
        f.context.write_line("late", None).unwrap();

        f.context.fix_expiration().unwrap();
        assert_eq!(
            f.storage.console_ttl(f.context.id()).unwrap(),
            Some(Duration::from_secs(500))
        );
        assert_eq!(
            f.backend.sorted_set_ttl(&f.context.id().set_key()),
            Some(Duration::from_secs(500))
        );
    }
}
