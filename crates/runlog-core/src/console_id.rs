//! Console session identifier
//!
//! A session is identified by the job id plus the instant the job entered
//! its processing state. The canonical string form is the start instant in
//! epoch milliseconds as 11 lowercase hex digits followed by the job id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ConsoleIdError;
use crate::keys::{CurrentKeyScheme, KeyScheme, LegacyKeyScheme};

/// Width of the hex timestamp prefix in the canonical form
const TIMESTAMP_WIDTH: usize = 11;

/// Largest timestamp (ms) that still fits the fixed-width prefix
const MAX_TIMESTAMP_MILLIS: i64 = 0xFFF_FFFF_FFFF;

/// Identifier of one job execution's console session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsoleId {
    job_id: String,
    timestamp_millis: i64,
}

impl ConsoleId {
    /// Create a console id from a job id and the job's processing start time
    ///
    /// The start time is truncated to millisecond precision.
    ///
    /// # Errors
    ///
    /// Fails if `job_id` is empty, or if the timestamp lies before the Unix
    /// epoch or beyond what the fixed-width canonical form can hold.
    pub fn new(job_id: impl Into<String>, started_at: DateTime<Utc>) -> Result<Self, ConsoleIdError> {
        let job_id = job_id.into();
        if job_id.is_empty() {
            return Err(ConsoleIdError::EmptyJobId);
        }

        let timestamp_millis = started_at.timestamp_millis();
        if !(0..=MAX_TIMESTAMP_MILLIS).contains(&timestamp_millis) {
            return Err(ConsoleIdError::TimestampOutOfRange(timestamp_millis));
        }

        Ok(Self {
            job_id,
            timestamp_millis,
        })
    }

    /// The job id this session belongs to
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Start instant in milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    /// Start instant of the session
    pub fn started_at(&self) -> DateTime<Utc> {
        // Range is validated on construction, so the fallback is unreachable.
        DateTime::from_timestamp_millis(self.timestamp_millis).unwrap_or_default()
    }

    /// Key of the ordered line log under the current key scheme
    pub fn set_key(&self) -> String {
        CurrentKeyScheme.log_key(self)
    }

    /// Key of the metadata hash under the current key scheme
    pub fn hash_key(&self) -> String {
        CurrentKeyScheme.meta_key(self)
    }

    /// Key used for both structures under the legacy key scheme
    pub fn legacy_key(&self) -> String {
        LegacyKeyScheme.log_key(self)
    }
}

impl fmt::Display for ConsoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:011x}{}", self.timestamp_millis, self.job_id)
    }
}

impl FromStr for ConsoleId {
    type Err = ConsoleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = s
            .get(..TIMESTAMP_WIDTH)
            .filter(|p| p.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
            .ok_or_else(|| ConsoleIdError::Malformed(s.to_string()))?;

        let timestamp_millis = i64::from_str_radix(prefix, 16)
            .map_err(|_| ConsoleIdError::Malformed(s.to_string()))?;

        let job_id = &s[TIMESTAMP_WIDTH..];
        if job_id.is_empty() {
            return Err(ConsoleIdError::EmptyJobId);
        }

        Ok(Self {
            job_id: job_id.to_string(),
            timestamp_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_canonical_form() {
        let id = ConsoleId::new("123", start()).unwrap();
        // 2016-01-01T00:00:00Z = 1451606400000 ms = 0x151fa7bdc00
        assert_eq!(id.to_string(), "151fa7bdc00123");
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = ConsoleId::new("job-42", start()).unwrap();
        let parsed: ConsoleId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.job_id(), "job-42");
        assert_eq!(parsed.started_at(), start());
    }

    #[test]
    fn test_job_id_may_contain_hex_characters() {
        let id = ConsoleId::new("abcdef", start()).unwrap();
        let parsed: ConsoleId = id.to_string().parse().unwrap();
        assert_eq!(parsed.job_id(), "abcdef");
    }

    #[test]
    fn test_empty_job_id_rejected() {
        assert_eq!(ConsoleId::new("", start()), Err(ConsoleIdError::EmptyJobId));
        assert_eq!(
            "151fa7bdc00".parse::<ConsoleId>(),
            Err(ConsoleIdError::EmptyJobId)
        );
    }

    #[test]
    fn test_pre_epoch_rejected() {
        let before = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            ConsoleId::new("1", before),
            Err(ConsoleIdError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(matches!("short".parse::<ConsoleId>(), Err(ConsoleIdError::Malformed(_))));
        assert!(matches!(
            "+51fa7bdc00123".parse::<ConsoleId>(),
            Err(ConsoleIdError::Malformed(_))
        ));
        assert!(matches!(
            "151FA7BDC00123".parse::<ConsoleId>(),
            Err(ConsoleIdError::Malformed(_))
        ));
    }

    #[test]
    fn test_sub_millisecond_precision_dropped() {
        let precise = start() + chrono::Duration::microseconds(1_500);
        let id = ConsoleId::new("1", precise).unwrap();
        assert_eq!(id.timestamp_millis(), start().timestamp_millis() + 1);
        assert_eq!(id, ConsoleId::new("1", start() + chrono::Duration::milliseconds(1)).unwrap());
    }

    #[test]
    fn test_derived_keys() {
        let id = ConsoleId::new("1", start()).unwrap();
        assert_eq!(id.set_key(), "console:151fa7bdc001");
        assert_eq!(id.hash_key(), "console:refs:151fa7bdc001");
        assert_eq!(id.legacy_key(), "151fa7bdc001");
    }
}
