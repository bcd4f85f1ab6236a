//! Write helpers that tolerate a missing session
//!
//! Job code receives its session as an `Option`: the filter opens none when
//! the job is not processing. These helpers let that code write
//! unconditionally; without a session nothing is written.

use runlog_core::TextColor;

use crate::context::ConsoleContext;
use crate::error::ConsoleError;
use crate::progress::{NoOpProgressBar, ProgressBar};

/// Write a line to the session, if there is one
pub fn write_line(context: Option<&ConsoleContext>, text: impl Into<String>) -> Result<(), ConsoleError> {
    match context {
        Some(context) => context.write_line(text, None),
        None => Ok(()),
    }
}

/// Write a colored line to the session, if there is one
pub fn write_colored_line(
    context: Option<&ConsoleContext>,
    color: TextColor,
    text: impl Into<String>,
) -> Result<(), ConsoleError> {
    match context {
        Some(context) => context.write_line(text, Some(color)),
        None => Ok(()),
    }
}

/// Create a progress bar in the session, or a [`NoOpProgressBar`] without one
pub fn write_progress_bar<'a>(
    context: Option<&'a ConsoleContext>,
    name: Option<&str>,
    initial: f64,
    color: Option<TextColor>,
) -> Result<Box<dyn ProgressBar + 'a>, ConsoleError> {
    match context {
        Some(context) => Ok(Box::new(context.write_progress_bar(name, initial, color)?)),
        None => Ok(Box::new(NoOpProgressBar)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use runlog_core::ConsoleId;
    use runlog_storage::{ConsoleStorage, DirectConsoleStorage, InMemoryBackend};
    use std::sync::Arc;

    #[test]
    fn test_without_session_nothing_happens() {
        write_line(None, "ignored").unwrap();
        write_colored_line(None, TextColor::RED, "ignored").unwrap();

        let bar = write_progress_bar(None, Some("bar"), 0.0, None).unwrap();
        bar.set_value(250.0).unwrap();
    }

    #[test]
    fn test_with_session_lines_are_written() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = Arc::new(DirectConsoleStorage::new(backend).with_worker_address("127.0.0.1"));
        let id = ConsoleId::new("ext", Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()).unwrap();
        let context = ConsoleContext::new(id.clone(), storage.clone()).unwrap();

        write_line(Some(&context), "plain").unwrap();
        write_colored_line(Some(&context), TextColor::YELLOW, "warn").unwrap();
        let bar = write_progress_bar(Some(&context), None, 20.0, None).unwrap();
        bar.set_value(40.0).unwrap();

        assert_eq!(storage.line_count(&id).unwrap(), 4);
        let lines = storage.lines(&id, 0, 3).unwrap();
        assert_eq!(lines[1].text_color.as_deref(), Some("#ffff00"));
        assert_eq!(storage.progress(&id).unwrap(), Some(40.0));
        assert!(matches!(bar.set_value(101.0), Err(ConsoleError::InvalidProgress(_))));
    }
}
