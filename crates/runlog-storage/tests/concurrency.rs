//! One writer, many readers on the same in-flight session

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::Utc;
use runlog_core::{ConsoleId, ConsoleLine};
use runlog_storage::{BufferedConsoleStorage, ConsoleHub, ConsoleStorage, InMemoryBackend, InMemoryConsoleHub};

const LINES: usize = 2_000;
const READERS: usize = 4;

#[test]
fn test_readers_see_consistent_prefixes() {
    let backend = Arc::new(InMemoryBackend::new());
    let hub = Arc::new(InMemoryConsoleHub::new());
    let storage = Arc::new(BufferedConsoleStorage::new(backend, hub.clone()).with_worker_address("127.0.0.1"));
    let id = ConsoleId::new("stress", Utc::now()).unwrap();
    storage.init_console(&id).unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let done = Arc::clone(&done);
            let id = id.clone();
            thread::spawn(move || {
                let mut last_count = 0;
                while !done.load(Ordering::Acquire) {
                    let count = storage.line_count(&id).unwrap();
                    assert!(count >= last_count, "count went backwards: {count} < {last_count}");
                    last_count = count;

                    if count > 0 {
                        let lines = storage.lines(&id, 0, count - 1).unwrap();
                        assert_eq!(lines.len(), count);
                        for (i, line) in lines.iter().enumerate() {
                            assert_eq!(line.message, format!("line {i}"));
                        }
                    }
                }
                last_count
            })
        })
        .collect();

    let writer = {
        let storage = Arc::clone(&storage);
        let id = id.clone();
        thread::spawn(move || {
            for i in 0..LINES {
                let line = ConsoleLine::text(format!("line {i}")).at(i as f64 * 0.001);
                storage.add_line(&id, line).unwrap();
            }
        })
    };

    writer.join().unwrap();
    done.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().unwrap() <= LINES);
    }

    storage.flush(&id).unwrap();
    assert!(!hub.contains(&id));
    assert_eq!(storage.line_count(&id).unwrap(), LINES);

    let persisted = storage.lines(&id, LINES - 3, LINES - 1).unwrap();
    let messages: Vec<_> = persisted.into_iter().map(|l| l.message).collect();
    assert_eq!(
        messages,
        vec![
            format!("line {}", LINES - 3),
            format!("line {}", LINES - 2),
            format!("line {}", LINES - 1)
        ]
    );
}

#[test]
fn test_sessions_are_independent() {
    let hub = Arc::new(InMemoryConsoleHub::new());

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                let id = ConsoleId::new(format!("job-{n}"), Utc::now()).unwrap();
                hub.init(&id).unwrap();
                for i in 0..100 {
                    hub.add_line(&id, ConsoleLine::text(format!("{n}:{i}"))).unwrap();
                }
                let lines = hub.lines(&id).snapshot();
                hub.flush(&id).unwrap();
                lines
            })
        })
        .collect();

    for (n, handle) in handles.into_iter().enumerate() {
        let lines = handle.join().unwrap();
        assert_eq!(lines.len(), 100);
        assert!(lines.iter().all(|l| l.message.starts_with(&format!("{n}:"))));
    }
    assert_eq!(hub.session_count(), 0);
}
