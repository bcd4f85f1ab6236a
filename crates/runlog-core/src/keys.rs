//! Versioned storage key schemes
//!
//! Every console session is stored as an ordered line log plus a metadata
//! hash. The names of those two structures changed over time; sessions
//! written under an older naming scheme stay readable forever. Each naming
//! convention is a [`KeyScheme`], and [`KeySchemes`] lists them newest first.

use std::fmt;

use crate::console_id::ConsoleId;

/// A naming convention for the two structures of a console session
pub trait KeyScheme: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Key of the ordered line log
    fn log_key(&self, id: &ConsoleId) -> String;

    /// Key of the metadata hash (overflow payloads, progress, job id)
    fn meta_key(&self, id: &ConsoleId) -> String;

    /// Whether a backend failure while resolving a reference line may be
    /// swallowed, returning the raw token instead
    ///
    /// Data under old schemes can predate the current backend layout.
    fn lenient_dereference(&self) -> bool {
        false
    }
}

/// Current scheme: `console:{id}` for the log, `console:refs:{id}` for metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentKeyScheme;

impl KeyScheme for CurrentKeyScheme {
    fn name(&self) -> &'static str {
        "current"
    }

    fn log_key(&self, id: &ConsoleId) -> String {
        format!("console:{id}")
    }

    fn meta_key(&self, id: &ConsoleId) -> String {
        format!("console:refs:{id}")
    }
}

/// Legacy scheme: the bare canonical id names both structures
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyKeyScheme;

impl KeyScheme for LegacyKeyScheme {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn log_key(&self, id: &ConsoleId) -> String {
        id.to_string()
    }

    fn meta_key(&self, id: &ConsoleId) -> String {
        id.to_string()
    }

    fn lenient_dereference(&self) -> bool {
        true
    }
}

/// Ordered set of key schemes, newest first
///
/// Writes go to [`KeySchemes::newest`]; reads walk [`KeySchemes::iter`] and
/// stop at the first scheme holding data; expiry touches every scheme.
#[derive(Debug)]
pub struct KeySchemes {
    schemes: Vec<Box<dyn KeyScheme>>,
}

impl Default for KeySchemes {
    fn default() -> Self {
        Self {
            schemes: vec![Box::new(CurrentKeyScheme), Box::new(LegacyKeyScheme)],
        }
    }
}

impl KeySchemes {
    /// Build a scheme list from newest to oldest
    ///
    /// Returns `None` for an empty list, since writes need a newest scheme.
    pub fn new(schemes: Vec<Box<dyn KeyScheme>>) -> Option<Self> {
        if schemes.is_empty() {
            None
        } else {
            Some(Self { schemes })
        }
    }

    /// The scheme all writes target
    pub fn newest(&self) -> &dyn KeyScheme {
        // Non-empty by construction
        self.schemes[0].as_ref()
    }

    /// Iterate schemes from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &dyn KeyScheme> {
        self.schemes.iter().map(|s| s.as_ref())
    }

    /// Number of schemes
    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}
