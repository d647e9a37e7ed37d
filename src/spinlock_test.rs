use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread, time,
};

use super::*;

#[test]
fn test_rw_spinlock_exclusion() {
    let lock = Arc::new(RWSpinlock::new());
    let shared = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut writers = vec![];
    for _ in 0..4 {
        let lock = Arc::clone(&lock);
        let shared = Arc::clone(&shared);
        writers.push(thread::spawn(move || {
            let start = time::Instant::now();
            while start.elapsed() < time::Duration::from_millis(200) {
                let _w = lock.acquire_write(false);
                shared.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    let mut readers = vec![];
    for _ in 0..4 {
        let lock = Arc::clone(&lock);
        let shared = Arc::clone(&shared);
        let violations = Arc::clone(&violations);
        readers.push(thread::spawn(move || {
            let start = time::Instant::now();
            while start.elapsed() < time::Duration::from_millis(200) {
                let _r = lock.acquire_read(false);
                let before = shared.load(Ordering::SeqCst);
                thread::yield_now();
                let after = shared.load(Ordering::SeqCst);
                if before != after {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for w in writers {
        w.join().unwrap();
    }
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(shared.load(Ordering::SeqCst) > 0);

    let stats = lock.to_stats().unwrap();
    assert!(stats.write_locks > 0);
    assert!(stats.read_locks > 0);
}

#[test]
fn test_rw_spinlock_stats_display() {
    let lock = RWSpinlock::new();
    {
        let _w = lock.acquire_write(true);
    }
    {
        let _r1 = lock.acquire_read(true);
        let _r2 = lock.acquire_read(true);
    }
    let stats = lock.to_stats().unwrap();
    assert_eq!(stats.write_locks, 1);
    assert_eq!(stats.read_locks, 2);
    let rendered = format!("{}", stats);
    assert!(rendered.contains("read_locks = 2"));
}
