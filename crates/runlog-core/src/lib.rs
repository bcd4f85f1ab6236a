//! # Runlog Core
//!
//! Core types, codecs and capabilities shared by the runlog crates.
//!
//! A job execution writes its console output into a *session*. Everything
//! the storage layer persists about a session is addressed through a
//! [`ConsoleId`], and every key it touches is derived from that id through a
//! [`KeyScheme`].
//!
//! ## Key Types
//!
//! - [`ConsoleId`]: Job id + start instant, with a canonical round-trippable string form
//! - [`ConsoleLine`]: A line written by a job (text or progress update)
//! - [`LineRecord`]: The stored form of a line, possibly a reference into the metadata hash
//! - [`KeySchemes`]: Ordered current/legacy key naming strategies
//!
//! ## Key Traits
//!
//! - [`KeyValueBackend`]: The transactional ordered-set + hash capability the store consumes
//! - [`JobStateSource`]: Read access to a job's current state snapshot
//! - [`Clock`]: Time abstraction for testability

pub mod backend;
pub mod clock;
pub mod color;
pub mod console_id;
pub mod error;
pub mod keys;
pub mod line;

pub use backend::{JobStateSnapshot, JobStateSource, KeyValueBackend, WriteBatch, WriteOp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use color::TextColor;
pub use console_id::ConsoleId;
pub use error::{BackendError, CodecError, ConsoleIdError, RunlogError};
pub use keys::{CurrentKeyScheme, KeyScheme, KeySchemes, LegacyKeyScheme};
pub use line::{ConsoleLine, LinePayload, LineRecord};
