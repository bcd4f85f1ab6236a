//! Logging settings
//!
//! Workers usually keep these under a `[logging]` table of their own
//! configuration file:
//!
//! ```toml
//! default_level = "info"
//! stdout = { format = "off" }
//! jsonl = { job_fields = true }
//!
//! [targets]
//! runlog_storage = "debug"
//!
//! [file]
//! directory = "/var/log/worker"
//! rotation = "hourly"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how the worker writes its logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is unset
    pub default_level: String,
    /// Per-target levels layered over the default, e.g. `runlog_storage = "trace"`
    pub targets: BTreeMap<String, String>,
    pub stdout: StdoutConfig,
    /// JSONL files written next to stdout, if any
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            targets: BTreeMap::new(),
            stdout: StdoutConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Colored, human-readable stdout at debug level
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            stdout: StdoutConfig {
                format: StdoutFormat::Pretty,
                ansi: true,
            },
            ..Self::default()
        }
    }

    /// Daily rotated JSONL files under `log_dir`, nothing on stdout
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            stdout: StdoutConfig {
                format: StdoutFormat::Off,
                ansi: false,
            },
            file: Some(FileConfig {
                directory: log_dir,
                max_files: Some(30),
                ..FileConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Warnings only, so test output stays readable
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            ..Self::default()
        }
    }

    /// Parse a `[logging]` table; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// Level directives for the configured targets, in target order
    pub fn directives(&self) -> impl Iterator<Item = String> + '_ {
        self.targets
            .iter()
            .map(|(target, level)| format!("{target}={level}"))
    }
}

/// Stdout output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    pub format: StdoutFormat,
    /// Color the pretty format; JSONL is never colored
    pub ansi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdoutFormat {
    Off,
    #[default]
    Jsonl,
    Pretty,
}

/// Rolling JSONL files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File names start with this, followed by the rotation date
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Oldest files beyond this count are deleted; ignored with `Never`
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "runlog".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.log`, truncated when the worker starts
    Never,
}

/// What each JSONL line carries besides the event itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Emit the `job` span with `job_id`, `console_id` and `execution_id`
    /// that a [`JobContextGuard`](crate::JobContextGuard) opens
    pub job_fields: bool,
    pub source_location: bool,
    pub thread_ids: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            job_fields: true,
            source_location: false,
            thread_ids: false,
        }
    }
}
