//! Progress bars

use parking_lot::Mutex;
use runlog_core::{ConsoleLine, TextColor};
use tracing::trace;

use crate::context::ConsoleContext;
use crate::error::ConsoleError;

/// Most decimals a bar rounds to; `f64` carries no more significant digits
pub const MAX_DIGITS: u32 = 15;

/// A progress bar a job can update
pub trait ProgressBar {
    /// Set the bar's value, in `[0, 100]`
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidProgress`] for values outside the range.
    fn set_value(&self, value: f64) -> Result<(), ConsoleError>;
}

#[derive(Debug)]
struct BarState {
    value: Option<f64>,
    name: Option<String>,
    color: Option<TextColor>,
}

/// Progress bar writing its updates into a console session
///
/// Values are rounded to a fixed number of decimals. Repeating the current
/// value writes nothing, and the bar's name and color are only sent with the
/// first update.
#[derive(Debug)]
pub struct DefaultProgressBar<'a> {
    context: &'a ConsoleContext,
    bar_id: String,
    digits: u32,
    state: Mutex<BarState>,
}

impl<'a> DefaultProgressBar<'a> {
    pub(crate) fn new(
        context: &'a ConsoleContext,
        bar_id: String,
        name: Option<&str>,
        color: Option<TextColor>,
        digits: u32,
    ) -> Self {
        Self {
            context,
            bar_id,
            digits: digits.min(MAX_DIGITS),
            state: Mutex::new(BarState {
                value: None,
                name: name.filter(|n| !n.is_empty()).map(str::to_string),
                color,
            }),
        }
    }

    /// Id of this bar within its session
    pub fn id(&self) -> &str {
        &self.bar_id
    }

    /// Last value written, if any
    pub fn value(&self) -> Option<f64> {
        self.state.lock().value
    }

    fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        (value * scale).round() / scale
    }
}

impl ProgressBar for DefaultProgressBar<'_> {
    fn set_value(&self, value: f64) -> Result<(), ConsoleError> {
        let value = self.round(value);
        if !(0.0..=100.0).contains(&value) {
            return Err(ConsoleError::InvalidProgress(value));
        }

        let mut state = self.state.lock();
        if state.value == Some(value) {
            return Ok(());
        }

        let line = ConsoleLine::progress(self.bar_id.as_str(), value)
            .with_progress_name(state.name.clone())
            .with_color(state.color);
        trace!(bar_id = %self.bar_id, value, "Progress update");
        self.context.add_line(line)?;

        state.value = Some(value);
        state.name = None;
        state.color = None;
        Ok(())
    }
}

/// Progress bar that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressBar;

impl ProgressBar for NoOpProgressBar {
    fn set_value(&self, _value: f64) -> Result<(), ConsoleError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use runlog_core::{ConsoleId, ManualClock};
    use runlog_storage::{ConsoleStorage, DirectConsoleStorage, InMemoryBackend};
    use std::sync::Arc;

    fn context() -> (ConsoleContext, Arc<DirectConsoleStorage>) {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let storage = Arc::new(
            DirectConsoleStorage::new(Arc::new(InMemoryBackend::with_clock(clock.clone())))
                .with_worker_address("127.0.0.1"),
        );
        let id = ConsoleId::new("bar-job", start).unwrap();
        let context = ConsoleContext::with_clock(id, storage.clone(), clock).unwrap();
        (context, storage)
    }

    fn written(context: &ConsoleContext, storage: &DirectConsoleStorage) -> Vec<ConsoleLine> {
        let count = storage.line_count(context.id()).unwrap();
        if count == 0 {
            return Vec::new();
        }
        storage.lines(context.id(), 0, count - 1).unwrap()
    }

    #[test]
    fn test_initial_zero_is_written() {
        let (context, storage) = context();
        let bar = context.write_progress_bar(None, 0.0, None).unwrap();

        assert_eq!(bar.value(), Some(0.0));
        let lines = written(&context, &storage);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].progress_value, Some(0.0));
    }

    #[test]
    fn test_name_and_color_only_on_first_update() {
        let (context, storage) = context();
        let bar = context
            .write_progress_bar(Some("upload"), 5.0, Some(TextColor::GREEN))
            .unwrap();
        bar.set_value(50.0).unwrap();

        let lines = written(&context, &storage);
        assert_eq!(lines[0].progress_name.as_deref(), Some("upload"));
        assert_eq!(lines[0].text_color.as_deref(), Some("#00ff00"));
        assert_eq!(lines[1].progress_name, None);
        assert_eq!(lines[1].text_color, None);
    }

    #[test]
    fn test_empty_name_is_dropped() {
        let (context, storage) = context();
        let _bar = context.write_progress_bar(Some(""), 1.0, None).unwrap();
        assert_eq!(written(&context, &storage)[0].progress_name, None);
    }

    #[test]
    fn test_unchanged_value_is_skipped() {
        let (context, storage) = context();
        let bar = context.write_progress_bar(None, 10.0, None).unwrap();

        bar.set_value(10.2).unwrap();
        bar.set_value(10.0).unwrap();
        bar.set_value(11.0).unwrap();

        let values: Vec<_> = written(&context, &storage)
            .iter()
            .map(|l| l.progress_value)
            .collect();
        assert_eq!(values, vec![Some(10.0), Some(11.0)]);
    }

    #[test]
    fn test_digits_control_rounding() {
        let (context, storage) = context();
        let bar = context
            .write_progress_bar_with_digits(None, 33.333, None, 2)
            .unwrap();

        assert_eq!(bar.value(), Some(33.33));
        assert_eq!(storage.progress(context.id()).unwrap(), Some(33.33));
    }

    #[test]
    fn test_excessive_digits_are_clamped() {
        let (context, _storage) = context();
        let bar = context
            .write_progress_bar_with_digits(None, 12.5, None, u32::MAX)
            .unwrap();

        assert_eq!(bar.value(), Some(12.5));
        bar.set_value(12.75).unwrap();
        assert_eq!(bar.value(), Some(12.75));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let (context, storage) = context();
        let bar = context.write_progress_bar(None, 0.0, None).unwrap();

        assert!(matches!(bar.set_value(-1.0), Err(ConsoleError::InvalidProgress(_))));
        assert!(matches!(bar.set_value(100.6), Err(ConsoleError::InvalidProgress(_))));
        assert!(matches!(bar.set_value(f64::NAN), Err(ConsoleError::InvalidProgress(_))));

        // rounds into range
        bar.set_value(100.4).unwrap();
        assert_eq!(bar.value(), Some(100.0));
        assert_eq!(written(&context, &storage).len(), 2);
    }

    #[test]
    fn test_noop_bar_accepts_anything() {
        let bar = NoOpProgressBar;
        assert!(bar.set_value(500.0).is_ok());
    }
}
