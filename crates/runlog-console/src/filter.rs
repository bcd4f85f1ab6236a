//! Job lifecycle filter
//!
//! [`ConsoleServerFilter`] opens a console session when a job starts
//! performing and finalizes it when the job is done: buffered lines are
//! flushed and the session's expiry is brought in line with the options.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use runlog_core::{Clock, ConsoleId, JobStateSnapshot, JobStateSource, KeyValueBackend, SystemClock};
use runlog_logging::JobContextGuard;
use runlog_storage::{BufferedConsoleStorage, ConsoleHub, ConsoleStorage, DirectConsoleStorage};
use tracing::{debug, instrument, warn};

use crate::context::ConsoleContext;
use crate::error::{ConfigError, ConsoleError};
use crate::options::ConsoleOptions;

/// Build the store selected by `options`
///
/// With `use_console_hub` lines are buffered in `hub` until the session is
/// flushed; otherwise every line is committed as it is written.
pub fn console_storage(
    options: &ConsoleOptions,
    backend: Arc<dyn KeyValueBackend>,
    hub: Arc<dyn ConsoleHub>,
) -> Arc<dyn ConsoleStorage> {
    let address = options.worker_address.clone();

    if options.use_console_hub {
        let storage = BufferedConsoleStorage::new(backend, hub);
        match address {
            Some(address) => Arc::new(storage.with_worker_address(address)),
            None => Arc::new(storage),
        }
    } else {
        let storage = DirectConsoleStorage::new(backend);
        match address {
            Some(address) => Arc::new(storage.with_worker_address(address)),
            None => Arc::new(storage),
        }
    }
}

/// A console session opened for a performing job
///
/// Dereferences to its [`ConsoleContext`]. While the session is alive the
/// job's context is attached to every span opened on this thread.
#[derive(Debug)]
pub struct ConsoleSession {
    context: ConsoleContext,
    job_guard: JobContextGuard,
}

impl Deref for ConsoleSession {
    type Target = ConsoleContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// Opens and finalizes console sessions around job execution
pub struct ConsoleServerFilter {
    options: ConsoleOptions,
    storage: Arc<dyn ConsoleStorage>,
    state_source: Arc<dyn JobStateSource>,
    clock: Arc<dyn Clock>,
}

impl ConsoleServerFilter {
    /// Create a filter writing to `backend`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `options` fail validation.
    pub fn new(
        options: ConsoleOptions,
        backend: Arc<dyn KeyValueBackend>,
        hub: Arc<dyn ConsoleHub>,
        state_source: Arc<dyn JobStateSource>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let storage = console_storage(&options, backend, hub);

        Ok(Self {
            options,
            storage,
            state_source,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` for line offsets
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The options this filter applies
    pub fn options(&self) -> &ConsoleOptions {
        &self.options
    }

    /// The store sessions are written to
    pub fn storage(&self) -> &Arc<dyn ConsoleStorage> {
        &self.storage
    }

    /// Open a session for a job about to perform
    ///
    /// Returns `None` when the job is unknown or not in the processing
    /// state; no session is written in that case.
    ///
    /// # Errors
    ///
    /// Fails if the processing state has no usable start time, the session
    /// already exists, or the store cannot be written.
    #[instrument(skip(self))]
    pub fn on_performing(&self, job_id: &str) -> Result<Option<ConsoleSession>, ConsoleError> {
        let Some(state) = self.state_source.state(job_id)? else {
            warn!("Job state not found, console disabled");
            return Ok(None);
        };

        if !state.is_processing() {
            warn!(state = %state.name, "Job is not processing, console disabled");
            return Ok(None);
        }

        let started_at = state.started_at().ok_or_else(|| {
            ConsoleError::invalid_state(format!(
                "job {job_id} has no valid {} value",
                JobStateSnapshot::STARTED_AT
            ))
        })?;

        let id = ConsoleId::new(job_id, started_at)?;
        let job_guard = JobContextGuard::for_console(&id);
        let context = ConsoleContext::with_clock(id, self.storage.clone(), self.clock.clone())?;

        Ok(Some(ConsoleSession { context, job_guard }))
    }

    /// Finalize a session after its job performed
    ///
    /// Buffered lines are flushed first, so the persisted structures exist
    /// when the expiry is applied. The session then either keeps the TTL its
    /// job assigned or expires after `expire_in`.
    ///
    /// If the flush fails the session is released anyway and its unflushed
    /// lines are lost.
    #[instrument(skip_all, fields(console_id = %session.id()))]
    pub fn on_performed(&self, session: ConsoleSession) -> Result<(), ConsoleError> {
        let ConsoleSession { context, job_guard } = session;

        if let Err(err) = context.flush() {
            let dropped = context.storage().discard(context.id());
            warn!(error = %err, dropped, "Console flush failed, session released");
            return Err(err);
        }

        if self.options.follow_job_retention_policy {
            context.fix_expiration()?;
        } else {
            context.expire(self.options.expire_in())?;
        }

        context.dispose();
        drop(job_guard);
        Ok(())
    }

    /// Apply a job's new retention to its console sessions
    ///
    /// `ttl` of `None` keeps the sessions forever.
    #[instrument(skip(self, starts), fields(sessions = starts.len()))]
    pub fn on_retention_changed(
        &self,
        job_id: &str,
        starts: &[DateTime<Utc>],
        ttl: Option<Duration>,
    ) -> Result<(), ConsoleError> {
        for started_at in starts {
            let id = ConsoleId::new(job_id, *started_at)?;
            match ttl {
                Some(ttl) => self.storage.expire(&id, ttl)?,
                None => self.storage.persist(&id)?,
            }
        }

        debug!(persisted = ttl.is_none(), "Console retention updated");
        Ok(())
    }
}

impl std::fmt::Debug for ConsoleServerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleServerFilter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use runlog_core::{BackendError, ManualClock};
    use runlog_storage::{InMemoryBackend, InMemoryConsoleHub};

    struct OneJob(Option<JobStateSnapshot>);

    impl JobStateSource for OneJob {
        fn state(&self, _job_id: &str) -> Result<Option<JobStateSnapshot>, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn filter(state: Option<JobStateSnapshot>) -> ConsoleServerFilter {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        ConsoleServerFilter::new(
            ConsoleOptions::default().with_worker_address("10.0.0.9"),
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryConsoleHub::new()),
            Arc::new(OneJob(state)),
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(start)))
    }

    #[test]
    fn test_unknown_job_has_no_session() {
        assert!(filter(None).on_performing("1").unwrap().is_none());
    }

    #[test]
    fn test_non_processing_job_has_no_session() {
        let state = JobStateSnapshot::new("Enqueued");
        assert!(filter(Some(state)).on_performing("1").unwrap().is_none());
    }

    #[test]
    fn test_missing_start_time_is_an_error() {
        let state = JobStateSnapshot::new("processing");
        let result = filter(Some(state)).on_performing("1");
        assert!(matches!(result, Err(ConsoleError::InvalidState(_))));
    }

    #[test]
    fn test_session_sets_job_context() {
        let state = JobStateSnapshot::new("Processing").with_data("StartedAt", "1717200000000");
        let filter = filter(Some(state));

        let session = filter.on_performing("12").unwrap().unwrap();
        assert_eq!(JobContextGuard::current_job_id().as_deref(), Some("12"));
        assert_eq!(
            JobContextGuard::current_console_id(),
            Some(session.id().to_string())
        );

        filter.on_performed(session).unwrap();
        assert!(JobContextGuard::current().is_none());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = ConsoleOptions::default().with_expire_in(Duration::from_secs(1));
        let result = ConsoleServerFilter::new(
            options,
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryConsoleHub::new()),
            Arc::new(OneJob(None)),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_storage_follows_hub_option() {
        let backend: Arc<dyn KeyValueBackend> = Arc::new(InMemoryBackend::new());
        let hub = Arc::new(InMemoryConsoleHub::new());
        let id = ConsoleId::new("5", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap();

        let buffered = console_storage(
            &ConsoleOptions::default().with_console_hub(true),
            backend.clone(),
            hub.clone(),
        );
        buffered.init_console(&id).unwrap();
        assert_eq!(hub.session_count(), 1);

        let direct = console_storage(&ConsoleOptions::default(), backend, hub.clone());
        let other = ConsoleId::new("6", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap();
        direct.init_console(&other).unwrap();
        assert_eq!(hub.session_count(), 1);
    }
}
