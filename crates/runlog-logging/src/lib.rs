//! Structured logging for runlog
//!
//! This crate wires the `tracing` events emitted by the runlog crates into
//! JSONL or human-readable output, and tags spans with the job being
//! processed.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Job Context**: Every line logged during a job carries its job and console session ids
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```no_run
//! use runlog_logging::{LogConfig, RunlogSubscriberBuilder};
//!
//! // Development mode with pretty human-readable output
//! let _guard = RunlogSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Job Context
//!
//! Use [`JobContextGuard`] to set the job for a scope:
//!
//! ```
//! use runlog_logging::JobContextGuard;
//!
//! let _guard = JobContextGuard::new("1024");
//!
//! // Lines logged in this scope carry job_id = "1024"
//! tracing::info!("Performing job");
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{FileConfig, JsonlConfig, LogConfig, RotationStrategy, StdoutConfig, StdoutFormat};
pub use context::{JOB_SPAN_TARGET, JobContextData, JobContextGuard};
pub use layers::jsonl_layer;

use std::fs::{self, File};

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory or file could not be created
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// The rolling file appender could not be built
    #[error("Log appender error: {0}")]
    Appender(String),

    /// A level directive could not be parsed
    #[error("Invalid log directive '{0}'")]
    Directive(String),

    /// A global subscriber is already installed
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Builder for configuring and initializing the runlog logging subscriber
///
/// By default, stdout output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
#[derive(Debug, Default)]
pub struct RunlogSubscriberBuilder {
    config: LogConfig,
}

impl RunlogSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Choose the stdout format, or turn stdout off
    pub fn with_stdout(mut self, format: StdoutFormat) -> Self {
        self.config.stdout.format = format;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration that will be installed
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally
    ///
    /// Returns the guard of the file writer, which must be kept alive for
    /// the duration of the program. Failures are reported on stderr.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {e}");
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber has already been set, or if the log
    /// file or a level directive cannot be set up.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = self.env_filter()?;
        let (layers, guard) = self.build_layers::<Layered<EnvFilter, Registry>>()?;

        Registry::default()
            .with(filter)
            .with(layers)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Build the output layers for subscriber `S`
    pub fn build_layers<S>(&self) -> Result<(Vec<BoxedLayer<S>>, Option<WorkerGuard>), LoggingError>
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
    {
        let mut stack: Vec<BoxedLayer<S>> = Vec::new();

        match self.config.stdout.format {
            StdoutFormat::Off => {}
            StdoutFormat::Jsonl => stack.push(jsonl_layer(&self.config.jsonl, std::io::stdout)),
            StdoutFormat::Pretty => stack.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.stdout.ansi)
                    .with_target(true)
                    .boxed(),
            ),
        }

        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            stack.push(jsonl_layer(&self.config.jsonl, writer));
            guard = Some(file_guard);
        }

        Ok((stack, guard))
    }

    /// Level filter from `RUST_LOG`, or the default level, plus target overrides
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        for directive in self.config.directives() {
            let parsed = directive
                .parse()
                .map_err(|_| LoggingError::Directive(directive.clone()))?;
            filter = filter.add_directive(parsed);
        }

        Ok(filter)
    }
}

/// Create the non-blocking writer for file output
///
/// A single file is truncated on start; rotating files are appended to.
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max) = config.max_files {
        builder = builder.max_log_files(max);
    }

    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    RunlogSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    RunlogSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for testing (minimal output, ignores repeated calls)
pub fn init_testing() {
    let _ = RunlogSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
