//! Size-bounded line compaction
//!
//! Backends limit the size of a single ordered-set member. Before a line is
//! staged, its encoded size is checked against that ceiling; a line that
//! would not fit has its message moved into the session's metadata hash
//! under a fresh random token, and the stored record carries only the token.

use runlog_core::{ConsoleLine, LineRecord};
use uuid::Uuid;

use crate::error::StorageError;

/// Maximum size in bytes of one stored value
pub const VALUE_FIELD_LIMIT: usize = 256;

/// Upper bound of what the JSON envelope, time offset and color add to a message
pub const ENVELOPE_OVERHEAD: usize = 36;

/// Outcome of compacting one line
#[derive(Debug, Clone, PartialEq)]
pub struct CompactedLine {
    /// Encoded record to add to the ordered log
    pub encoded: String,
    /// Overflow entry `(token, message)` for the metadata hash, if the
    /// message did not fit inline
    pub overflow: Option<(String, String)>,
}

impl CompactedLine {
    /// Whether the message was moved out of the record
    pub fn is_reference(&self) -> bool {
        self.overflow.is_some()
    }
}

/// Decides whether a line is stored inline or by reference
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    value_limit: usize,
    overhead: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            value_limit: VALUE_FIELD_LIMIT,
            overhead: ENVELOPE_OVERHEAD,
        }
    }
}

impl CompactionPolicy {
    /// Create a policy with a custom value ceiling and envelope overhead
    pub fn new(value_limit: usize, overhead: usize) -> Self {
        Self {
            value_limit,
            overhead,
        }
    }

    /// Maximum size of a stored value
    pub fn value_limit(&self) -> usize {
        self.value_limit
    }

    /// Encode `line`, moving its message out when the result would not fit
    ///
    /// Messages longer than the ceiling minus the envelope overhead are
    /// moved without trying to encode them first.
    pub fn compact(&self, line: &ConsoleLine) -> Result<CompactedLine, StorageError> {
        if line.message.len() <= self.value_limit.saturating_sub(self.overhead) {
            let encoded = LineRecord::inline(line).encode()?;
            if encoded.len() <= self.value_limit {
                return Ok(CompactedLine {
                    encoded,
                    overflow: None,
                });
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        let encoded = LineRecord::referencing(line, token.as_str()).encode()?;

        Ok(CompactedLine {
            encoded,
            overflow: Some((token, line.message.clone())),
        })
    }
}
