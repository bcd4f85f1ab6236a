//! # Runlog Console
//!
//! Job-facing side of runlog: the per-execution session a job writes its
//! output through, progress bars, the filter that opens and finalizes
//! sessions around job execution, and the read API used by monitoring
//! surfaces.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use runlog_console::{ConsoleApi, ConsoleContext, LineType, ProgressBar};
//! use runlog_core::{ConsoleId, TextColor};
//! use runlog_storage::{ConsoleStorage, DirectConsoleStorage, InMemoryBackend};
//!
//! let started_at = Utc::now();
//! let storage: Arc<dyn ConsoleStorage> =
//!     Arc::new(DirectConsoleStorage::new(Arc::new(InMemoryBackend::new())));
//!
//! let context = ConsoleContext::new(ConsoleId::new("42", started_at)?, storage.clone())?;
//! context.write_line("Importing", Some(TextColor::DARK_CYAN))?;
//! let bar = context.write_progress_bar(Some("rows"), 0.0, None)?;
//! bar.set_value(100.0)?;
//! context.dispose();
//!
//! let api = ConsoleApi::new(storage);
//! assert_eq!(api.lines("42", started_at, LineType::Any)?.len(), 2);
//! assert_eq!(api.progress("42", started_at)?, Some(100.0));
//! # Ok::<(), runlog_console::ConsoleError>(())
//! ```

pub mod context;
pub mod error;
pub mod extensions;
pub mod filter;
pub mod monitoring;
pub mod options;
pub mod progress;

pub use context::{ConsoleContext, OFFSET_EPSILON};
pub use error::{ConfigError, ConsoleError};
pub use filter::{ConsoleServerFilter, ConsoleSession, console_storage};
pub use monitoring::{ConsoleApi, LineDto, LineType};
pub use options::ConsoleOptions;
pub use progress::{DefaultProgressBar, MAX_DIGITS, NoOpProgressBar, ProgressBar};
