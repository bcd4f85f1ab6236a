//! Console configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest accepted expiry
pub const MIN_EXPIRE_IN_SECS: u64 = 60;

/// Smallest accepted poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Configuration options for console sessions
///
/// Loadable from TOML; missing keys take their defaults:
///
/// ```toml
/// expire_in_secs = 86400
/// follow_job_retention_policy = false
/// use_console_hub = true
/// worker_address = "10.0.0.5"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleOptions {
    /// Expiry of console sessions in seconds, when not following the job's retention
    pub expire_in_secs: u64,

    /// Whether sessions expire together with their job; `expire_in_secs` is ignored when set
    pub follow_job_retention_policy: bool,

    /// How often a live view polls for new lines, in milliseconds
    pub poll_interval_ms: u64,

    /// Background color of the console view
    pub background_color: String,

    /// Text color of the console view
    pub text_color: String,

    /// Timestamp color of the console view
    pub timestamp_color: String,

    /// Buffer lines in memory and write them in one transaction when the job completes
    pub use_console_hub: bool,

    /// Address recorded for live-tail routing; detected when absent
    pub worker_address: Option<String>,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            expire_in_secs: 24 * 60 * 60,
            follow_job_retention_policy: true,
            poll_interval_ms: 1000,
            background_color: "#0d3163".to_string(),
            text_color: "#ffffff".to_string(),
            timestamp_color: "#00aad7".to_string(),
            use_console_hub: false,
            worker_address: None,
        }
    }
}

impl ConsoleOptions {
    /// Session expiry as a duration
    pub fn expire_in(&self) -> Duration {
        Duration::from_secs(self.expire_in_secs)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the session expiry (seconds precision)
    pub fn with_expire_in(mut self, expire_in: Duration) -> Self {
        self.expire_in_secs = expire_in.as_secs();
        self
    }

    /// Set whether sessions follow the job's retention policy
    pub fn with_follow_job_retention_policy(mut self, follow: bool) -> Self {
        self.follow_job_retention_policy = follow;
        self
    }

    /// Set whether lines are buffered until the job completes
    pub fn with_console_hub(mut self, enabled: bool) -> Self {
        self.use_console_hub = enabled;
        self
    }

    /// Set the recorded worker address
    pub fn with_worker_address(mut self, address: impl Into<String>) -> Self {
        self.worker_address = Some(address.into());
        self
    }

    /// Check the bounds of every option
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the expiry is below one minute or
    /// the poll interval below 100 ms.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expire_in_secs < MIN_EXPIRE_IN_SECS {
            return Err(ConfigError::invalid(format!(
                "expire_in_secs must be at least {MIN_EXPIRE_IN_SECS}, got {}",
                self.expire_in_secs
            )));
        }

        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::invalid(format!(
                "poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            )));
        }

        Ok(())
    }

    /// Parse and validate options from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
