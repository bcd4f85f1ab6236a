//! Read API for monitoring surfaces

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use runlog_core::{ConsoleId, ConsoleLine, KeyValueBackend};
use runlog_storage::{ConsoleHub, ConsoleStorage};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConsoleError;
use crate::filter::console_storage;
use crate::options::ConsoleOptions;

/// Which lines [`ConsoleApi::lines`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    #[default]
    Any,
    Text,
    ProgressBar,
}

/// A console line as shown to monitoring callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineDto {
    Text {
        timestamp: DateTime<Utc>,
        color: Option<String>,
        text: String,
    },
    /// All updates of one bar, collapsed into its latest state
    ProgressBar {
        timestamp: DateTime<Utc>,
        color: Option<String>,
        id: String,
        name: Option<String>,
        progress: f64,
    },
}

impl LineDto {
    /// When the line was first written
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Text { timestamp, .. } | Self::ProgressBar { timestamp, .. } => *timestamp,
        }
    }

    fn from_line(line: ConsoleLine, started_at: DateTime<Utc>) -> Self {
        let offset = chrono::Duration::microseconds((line.time_offset * 1_000_000.0).round() as i64);
        let timestamp = started_at.checked_add_signed(offset).unwrap_or(started_at);

        match line.progress_value {
            Some(progress) => Self::ProgressBar {
                timestamp,
                color: line.text_color,
                id: line.message,
                name: line.progress_name,
                progress,
            },
            None => Self::Text {
                timestamp,
                color: line.text_color,
                text: line.message,
            },
        }
    }
}

/// Read-only access to console sessions
pub struct ConsoleApi {
    storage: Arc<dyn ConsoleStorage>,
}

impl ConsoleApi {
    /// Read through `storage`
    pub fn new(storage: Arc<dyn ConsoleStorage>) -> Self {
        Self { storage }
    }

    /// Read through the store selected by `options`
    pub fn from_options(
        options: &ConsoleOptions,
        backend: Arc<dyn KeyValueBackend>,
        hub: Arc<dyn ConsoleHub>,
    ) -> Self {
        Self::new(console_storage(options, backend, hub))
    }

    /// Number of lines in the session
    pub fn line_count(&self, job_id: &str, started_at: DateTime<Utc>) -> Result<usize, ConsoleError> {
        let id = ConsoleId::new(job_id, started_at)?;
        Ok(self.storage.line_count(&id)?)
    }

    /// Lines of the session started at `started_at`, in write order
    ///
    /// Progress updates are collapsed per bar: the entry sits at the position
    /// of the bar's first update and carries its latest value and color.
    pub fn lines(
        &self,
        job_id: &str,
        started_at: DateTime<Utc>,
        line_type: LineType,
    ) -> Result<Vec<LineDto>, ConsoleError> {
        let id = ConsoleId::new(job_id, started_at)?;

        let count = self.storage.line_count(&id)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut result = Vec::with_capacity(count);
        let mut bars: HashMap<String, usize> = HashMap::new();

        for line in self.storage.lines(&id, 0, count - 1)? {
            if line.is_progress() {
                if line_type == LineType::Text {
                    continue;
                }

                if let Some(&index) = bars.get(&line.message) {
                    if let Some(LineDto::ProgressBar { progress, color, .. }) = result.get_mut(index) {
                        *progress = line.progress_value.unwrap_or(*progress);
                        if line.text_color.is_some() {
                            *color = line.text_color;
                        }
                    }
                    continue;
                }

                bars.insert(line.message.clone(), result.len());
            } else if line_type == LineType::ProgressBar {
                continue;
            }

            result.push(LineDto::from_line(line, id.started_at()));
        }

        trace!(console_id = %id, lines = result.len(), "Console lines read");
        Ok(result)
    }

    /// Latest value of the session's primary progress bar
    pub fn progress(&self, job_id: &str, started_at: DateTime<Utc>) -> Result<Option<f64>, ConsoleError> {
        let id = ConsoleId::new(job_id, started_at)?;
        Ok(self.storage.progress(&id)?)
    }
}

impl std::fmt::Debug for ConsoleApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleApi").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use runlog_core::{ManualClock, TextColor};
    use runlog_storage::{DirectConsoleStorage, InMemoryBackend};

    use crate::context::ConsoleContext;
    use crate::progress::ProgressBar;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 4, 10, 0, 0).unwrap()
    }

    fn seeded() -> ConsoleApi {
        let clock = Arc::new(ManualClock::new(start()));
        let storage: Arc<dyn ConsoleStorage> = Arc::new(
            DirectConsoleStorage::new(Arc::new(InMemoryBackend::new())).with_worker_address("127.0.0.1"),
        );
        let id = ConsoleId::new("api", start()).unwrap();
        let context = ConsoleContext::with_clock(id, storage.clone(), clock.clone()).unwrap();

        context.write_line("starting", None).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let bar = context
            .write_progress_bar(Some("items"), 0.0, Some(TextColor::CYAN))
            .unwrap();
        clock.advance(chrono::Duration::seconds(1));
        context.write_line("halfway", Some(TextColor::GREEN)).unwrap();
        bar.set_value(50.0).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        bar.set_value(100.0).unwrap();
        context.write_line("done", None).unwrap();

        ConsoleApi::new(storage)
    }

    #[test]
    fn test_progress_updates_are_aggregated() {
        let api = seeded();
        let lines = api.lines("api", start(), LineType::Any).unwrap();

        assert_eq!(lines.len(), 4);
        assert!(matches!(&lines[0], LineDto::Text { text, .. } if text == "starting"));
        match &lines[1] {
            LineDto::ProgressBar {
                id,
                name,
                progress,
                color,
                timestamp,
            } => {
                assert_eq!(id, "1");
                assert_eq!(name.as_deref(), Some("items"));
                assert_eq!(*progress, 100.0);
                assert_eq!(color.as_deref(), Some("#00ffff"));
                assert_eq!(*timestamp, start() + chrono::Duration::seconds(1));
            }
            other => panic!("expected a progress bar, got {other:?}"),
        }
        assert!(matches!(&lines[2], LineDto::Text { text, color, .. }
            if text == "halfway" && color.as_deref() == Some("#00ff00")));
        assert!(matches!(&lines[3], LineDto::Text { text, .. } if text == "done"));
    }

    #[test]
    fn test_line_type_filters() {
        let api = seeded();

        let text = api.lines("api", start(), LineType::Text).unwrap();
        assert_eq!(text.len(), 3);
        assert!(text.iter().all(|l| matches!(l, LineDto::Text { .. })));

        let bars = api.lines("api", start(), LineType::ProgressBar).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn test_timestamps_are_absolute() {
        let api = seeded();
        let lines = api.lines("api", start(), LineType::Text).unwrap();

        assert_eq!(lines[0].timestamp(), start());
        assert_eq!(lines[1].timestamp(), start() + chrono::Duration::seconds(2));
    }

    #[test]
    fn test_progress_and_count() {
        let api = seeded();
        assert_eq!(api.progress("api", start()).unwrap(), Some(100.0));
        assert_eq!(api.line_count("api", start()).unwrap(), 6);
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let api = seeded();
        assert!(api.lines("other", start(), LineType::Any).unwrap().is_empty());
        assert_eq!(api.progress("other", start()).unwrap(), None);
    }

    #[test]
    fn test_out_of_range_offset_keeps_session_start() {
        let line = ConsoleLine::text("from the far future").at(1e300);
        let dto = LineDto::from_line(line, start());
        assert_eq!(dto.timestamp(), start());
    }

    #[test]
    fn test_dto_serialization_is_tagged() {
        let dto = LineDto::Text {
            timestamp: start(),
            color: None,
            text: "hi".to_string(),
        };
        let value = serde_json::to_value(&dto).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hi");
    }
}
