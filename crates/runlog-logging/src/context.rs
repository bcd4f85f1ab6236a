//! Job context injection
//!
//! This module provides thread-local storage for the job currently being
//! processed. Each guard also enters a `job` span recording the job id and
//! console session id, so every event logged within the scope carries them.

use std::cell::RefCell;

use runlog_core::ConsoleId;
use tracing::span::EnteredSpan;
use uuid::Uuid;

/// Target of the `job` span entered by [`JobContextGuard`]
pub const JOB_SPAN_TARGET: &str = "runlog::job";

/// Job context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContextData {
    /// Id of the job being processed
    pub job_id: String,
    /// Canonical id of the job's console session, once one exists
    pub console_id: Option<String>,
    /// Unique id of this execution attempt
    pub execution_id: Uuid,
}

thread_local! {
    static JOB_CONTEXT: RefCell<Option<JobContextData>> = const { RefCell::new(None) };
}

/// RAII guard for job context
///
/// When this guard is created, it sets the job context for the current thread
/// and enters a `job` span with `job_id`, `console_id` and `execution_id`
/// fields. When it's dropped, it exits the span and restores the previous
/// context (if any). The span is entered on the creating thread, so the guard
/// is not `Send`.
///
/// # Example
///
/// ```
/// use runlog_logging::context::JobContextGuard;
///
/// let _guard = JobContextGuard::new("1024");
///
/// // Events in this scope sit inside a `job` span with job_id = "1024"
/// tracing::info!("Performing job");
/// assert_eq!(JobContextGuard::current_job_id().as_deref(), Some("1024"));
/// ```
#[derive(Debug)]
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct JobContextGuard {
    previous: Option<JobContextData>,
    _span: EnteredSpan,
}

impl JobContextGuard {
    /// Set the job context for the current scope
    pub fn new(job_id: impl Into<String>) -> Self {
        Self::install(JobContextData {
            job_id: job_id.into(),
            console_id: None,
            execution_id: Uuid::new_v4(),
        })
    }

    /// Set the job context of a console session for the current scope
    pub fn for_console(id: &ConsoleId) -> Self {
        Self::install(JobContextData {
            job_id: id.job_id().to_string(),
            console_id: Some(id.to_string()),
            execution_id: Uuid::new_v4(),
        })
    }

    fn install(data: JobContextData) -> Self {
        let span = tracing::info_span!(
            target: JOB_SPAN_TARGET,
            "job",
            job_id = %data.job_id,
            console_id = data.console_id.as_deref(),
            execution_id = %data.execution_id,
        );
        let previous = JOB_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self {
            previous,
            _span: span.entered(),
        }
    }

    /// Get the current job context (if any)
    pub fn current() -> Option<JobContextData> {
        JOB_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current job id (if set)
    pub fn current_job_id() -> Option<String> {
        Self::current().map(|ctx| ctx.job_id)
    }

    /// Get the current console session id (if set)
    pub fn current_console_id() -> Option<String> {
        Self::current().and_then(|ctx| ctx.console_id)
    }
}

impl Drop for JobContextGuard {
    fn drop(&mut self) {
        JOB_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to run a block within a job context
///
/// # Example
///
/// ```
/// use runlog_logging::with_job_context;
///
/// with_job_context!("42", {
///     tracing::info!("Performing job");
/// });
/// ```
#[macro_export]
macro_rules! with_job_context {
    ($job_id:expr, $body:block) => {{
        let _guard = $crate::context::JobContextGuard::new($job_id);
        $body
    }};
}
