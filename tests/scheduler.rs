use std::convert::TryInto;
use std::sync::Arc;

use odb::datastore::bank::Bank;
use odb::datastore::Datastore;
use odb::index::{Comparator, Index};
use odb::scheduler::{Scheduler, WorkFlags};
use odb::{IndexKind, IndexSpec, MetaFlags, Odb, OdbConfig};

fn u32_cmp() -> Comparator {
    Arc::new(|a: &[u8], b: &[u8]| {
        let a = u32::from_ne_bytes(a.try_into().unwrap());
        let b = u32::from_ne_bytes(b.try_into().unwrap());
        a.cmp(&b) as i32
    })
}

#[test]
fn scheduled_inserts_reach_every_index_in_the_all_group() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    let by_value = odb
        .create_index(IndexSpec::new(IndexKind::RbTree, u32_cmp()))
        .unwrap();
    let by_value_ll = odb
        .create_index(IndexSpec::new(IndexKind::LinkedList, u32_cmp()))
        .unwrap();

    odb.start_scheduler(4);
    for n in 0..50u32 {
        odb.add_data(&n.to_ne_bytes(), true).unwrap();
    }
    odb.block_until_done().unwrap();

    assert_eq!(by_value.count(), 50);
    assert_eq!(by_value_ll.count(), 50);
}

#[test]
fn block_until_done_without_a_running_scheduler_errors() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    assert!(odb.block_until_done().is_err());
}

#[test]
fn start_scheduler_default_sizes_to_the_host_core_count() {
    let ds: Arc<dyn Datastore> = Arc::new(Bank::new(4, 8, MetaFlags::none()).unwrap());
    let odb = Odb::new(ds, OdbConfig::default());
    odb.start_scheduler_default();
    odb.add_data(&1u32.to_ne_bytes(), true).unwrap();
    odb.block_until_done().unwrap();
}

#[test]
fn same_class_workloads_never_run_concurrently() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    let sched = Scheduler::new(4);
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let active = active.clone();
        let max_seen = max_seen.clone();
        sched
            .add_work(
                Some(1),
                WorkFlags::NONE,
                Box::new(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    active.fetch_sub(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    sched.block_until_done();
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn background_and_high_priority_together_is_rejected() {
    let sched = Scheduler::new(1);
    let err = sched
        .add_work(
            None,
            WorkFlags::BACKGROUND | WorkFlags::HIGH_PRIORITY,
            Box::new(|| {}),
        )
        .unwrap_err();
    assert!(format!("{}", err).len() > 0);
}
