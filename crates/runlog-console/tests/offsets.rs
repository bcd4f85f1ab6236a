//! Time offset ordering under arbitrary clock behaviour

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use runlog_console::ConsoleContext;
use runlog_core::{ConsoleId, ManualClock};
use runlog_storage::{BufferedConsoleStorage, ConsoleStorage, InMemoryBackend, InMemoryConsoleHub};

proptest! {
    #[test]
    fn offsets_strictly_increase(steps in prop::collection::vec(-5i64..20, 1..60)) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let storage = Arc::new(
            BufferedConsoleStorage::new(
                Arc::new(InMemoryBackend::new()),
                Arc::new(InMemoryConsoleHub::new()),
            )
            .with_worker_address("127.0.0.1"),
        );
        let id = ConsoleId::new("prop", start).unwrap();
        let context = ConsoleContext::with_clock(id.clone(), storage.clone(), clock.clone()).unwrap();

        for (i, step) in steps.iter().enumerate() {
            // sub-millisecond steps collapse onto the same rounded offset
            clock.advance(chrono::Duration::microseconds(step * 250));
            context.write_line(format!("line {i}"), None).unwrap();
        }

        let lines = storage.lines(&id, 0, steps.len() - 1).unwrap();
        prop_assert_eq!(lines.len(), steps.len());
        for pair in lines.windows(2) {
            prop_assert!(pair[1].time_offset > pair[0].time_offset);
        }
    }
}

#[test]
fn concurrent_writers_get_distinct_offsets() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let storage = Arc::new(
        BufferedConsoleStorage::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryConsoleHub::new()),
        )
        .with_worker_address("127.0.0.1"),
    );
    let id = ConsoleId::new("threads", start).unwrap();
    let context = ConsoleContext::with_clock(id.clone(), storage.clone(), clock).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let context = &context;
            scope.spawn(move || {
                for i in 0..250 {
                    context.write_line(format!("{t}:{i}"), None).unwrap();
                }
            });
        }
    });

    let lines = storage.lines(&id, 0, 999).unwrap();
    assert_eq!(lines.len(), 1000);
    for pair in lines.windows(2) {
        assert!(pair[1].time_offset > pair[0].time_offset);
    }
}
