use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;

#[test]
fn test_same_class_serialized() {
    let sched = Scheduler::new(4);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    for i in 0..20u64 {
        let order = order.clone();
        sched
            .add_work(
                Some(1),
                WorkFlags::NONE,
                Box::new(move || {
                    std::thread::sleep(Duration::from_micros(200));
                    order.lock().unwrap().push(i);
                }),
            )
            .unwrap();
    }
    sched.block_until_done();
    let got = order.lock().unwrap().clone();
    assert_eq!(got, (0..20u64).collect::<Vec<_>>());
}

#[test]
fn test_independent_classes_run_concurrently() {
    let sched = Scheduler::new(4);
    let counter = Arc::new(AtomicUsize::new(0));
    for class in 0..4u64 {
        let counter = counter.clone();
        sched
            .add_work(
                Some(class),
                WorkFlags::NONE,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    sched.block_until_done();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_read_only_runs_concurrently_within_class() {
    let sched = Scheduler::new(4);
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    for _ in 0..8 {
        let active = active.clone();
        let max_seen = max_seen.clone();
        sched
            .add_work(
                Some(7),
                WorkFlags::READ_ONLY,
                Box::new(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    sched.block_until_done();
    assert!(max_seen.load(Ordering::SeqCst) > 1);
}

#[test]
fn test_background_runs_after_regular_work() {
    // Queue both with zero workers running, so enqueue order can't race
    // against a worker that's already draining the queue.
    let sched = Scheduler::new(0);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let order = order.clone();
        sched
            .add_work(
                None,
                WorkFlags::BACKGROUND,
                Box::new(move || order.lock().unwrap().push("background")),
            )
            .unwrap();
    }
    {
        let order = order.clone();
        sched
            .add_work(
                None,
                WorkFlags::NONE,
                Box::new(move || order.lock().unwrap().push("normal")),
            )
            .unwrap();
    }
    sched.update_num_threads(1);
    sched.block_until_done();
    assert_eq!(*order.lock().unwrap(), vec!["normal", "background"]);
}

#[test]
fn test_rejects_urgent_and_conflicting_flags() {
    let sched = Scheduler::new(1);
    assert!(sched
        .add_work(None, WorkFlags::URGENT, Box::new(|| {}))
        .is_err());
    assert!(sched
        .add_work(
            None,
            WorkFlags::BACKGROUND | WorkFlags::HIGH_PRIORITY,
            Box::new(|| {}),
        )
        .is_err());
}

#[test]
fn test_update_num_threads_grow_and_shrink() {
    let sched = Scheduler::new(1);
    sched.update_num_threads(4);
    let counter = Arc::new(AtomicUsize::new(0));
    for i in 0..50u64 {
        let counter = counter.clone();
        sched
            .add_work(Some(i % 3), WorkFlags::NONE, Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }
    sched.block_until_done();
    assert_eq!(counter.load(Ordering::SeqCst), 50);
    sched.update_num_threads(1);
}

#[test]
fn test_random_classes_never_run_out_of_order_within_class() {
    let _ = env_logger::try_init();
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let sched = Scheduler::new(4);
    let seen: Arc<std::sync::Mutex<std::collections::HashMap<u64, u64>>> =
        Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
    for i in 0..200u64 {
        let class = rng.gen_range(0..5u64);
        let seen = seen.clone();
        sched
            .add_work(
                Some(class),
                WorkFlags::NONE,
                Box::new(move || {
                    let mut seen = seen.lock().unwrap();
                    let last = seen.entry(class).or_insert(0);
                    assert!(i >= *last, "same-class work must run in submission order");
                    *last = i;
                }),
            )
            .unwrap();
    }
    sched.block_until_done();
}
